//! Front-end actors that translate a remote-debugging client's requests into
//! JSON-RPC calls against a debug target.
//!
//! The actor tree below [`RootActor`] mirrors what the front-end expects:
//!
//! ```text
//! root
//! └── tab                           one per debuggable target
//!     ├── console                   lazy
//!     ├── inspector                 lazy
//!     │   ├── domwalker ── domnode…
//!     │   ├── pagestyle ── domstylerule…
//!     │   └── highlighter
//!     ├── stylesheets ── stylesheet… lazy
//!     └── thread
//!         ├── source ── breakpoint…
//!         ├── frame…
//!         └── pause ── obj / longstractor…
//! ```
//!
//! Every actor that talks to the target shares one [`TabContext`], rebuilt
//! whenever the tab detaches.

pub mod console;
pub mod context;
pub mod grips;
pub mod inspector;
pub mod options;
pub mod root;
pub mod styles;
pub mod tab;
pub mod thread;
pub mod url;

#[cfg(test)]
mod test_support;

pub use context::TabContext;
pub use options::BridgeOptions;
pub use root::{RootActor, StaticTabSource, TabSource};
pub use tab::TabActor;
