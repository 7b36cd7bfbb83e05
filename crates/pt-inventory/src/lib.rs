//! Inventory reconciliation for Pantry.
//!
//! A [`Session`] keeps one user's in-memory view in step with the document
//! store: every add, remove, or edit is a read-modify-write followed by a full
//! reload, and every reload kicks off a best-effort refresh of recipe
//! suggestions in the background. [`Pantry`] swaps sessions as users sign in
//! and out.

mod pantry;
mod recommend;
mod session;
mod state;
#[cfg(test)]
mod testing;

pub use pantry::{Pantry, Services};
pub use recommend::build_prompt;
pub use session::{NoticeReceiver, Session};
