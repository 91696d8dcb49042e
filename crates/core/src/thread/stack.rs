//! Frame bookkeeping across pauses.

/// Frames of the paused thread, oldest first, keyed by the target's call
/// frame id.
#[derive(Debug)]
pub struct Stack<T> {
	frames: Vec<(String, T)>,
}

impl<T> Default for Stack<T> {
	fn default() -> Self {
		Self { frames: Vec::new() }
	}
}

impl<T> Stack<T> {
	/// Replaces the stack with `ids` (oldest first).
	///
	/// Frames are matched by position from the oldest until the ids
	/// diverge. Matched frames are kept, the rest of the old stack is
	/// returned as expired and `make` builds the new remainder.
	pub fn update(&mut self, ids: Vec<String>, mut make: impl FnMut(usize, &str) -> T) -> Vec<T> {
		let common = self
			.frames
			.iter()
			.zip(&ids)
			.take_while(|((old, _), new)| old == *new)
			.count();
		let expired = self.frames.split_off(common).into_iter().map(|(_, frame)| frame).collect();
		for (index, id) in ids.into_iter().enumerate().skip(common) {
			let frame = make(index, &id);
			self.frames.push((id, frame));
		}
		expired
	}

	/// Drops every frame, returning them.
	pub fn clear(&mut self) -> Vec<T> {
		self.frames.drain(..).map(|(_, frame)| frame).collect()
	}

	pub fn len(&self) -> usize {
		self.frames.len()
	}

	pub fn is_empty(&self) -> bool {
		self.frames.is_empty()
	}

	/// Distance from the youngest frame.
	pub fn depth(&self, index: usize) -> usize {
		self.frames.len() - 1 - index
	}

	/// Frames paired with their depth, oldest first.
	pub fn iter(&self) -> impl DoubleEndedIterator<Item = (usize, &T)> {
		let len = self.frames.len();
		self.frames.iter().enumerate().map(move |(index, (_, frame))| (len - 1 - index, frame))
	}

	pub fn youngest(&self) -> Option<&T> {
		self.frames.last().map(|(_, frame)| frame)
	}
}
