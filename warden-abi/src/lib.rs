#![cfg_attr(not(test), no_std)]

#[cfg(feature = "std")]
extern crate std;

pub mod consts;
pub mod events;
pub mod matcher;
pub mod rules;

pub use consts::*;
pub use events::{ConnectEvent, ExecEvent, OpenEvent};
pub use rules::{ConnectRule, DnsCacheEntry, ExecRule, OpenRule, PendingExecArgs};
