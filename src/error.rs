//! Error types shared by the store and the runtime.

use thiserror::Error;

/// Errors surfaced by stores, bound actions and the runtime.
///
/// Every variant is a programming error on the caller's side. Panics raised
/// by relay subscribers are not reported here; the relay isolates and logs
/// them instead.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// A hook or store accessor was called while no mount was rendering.
    #[error("store accessor called outside of a mount render")]
    NoActiveMount,

    /// A bound action was looked up by a name the store was not built with.
    #[error("no action named `{0}` is registered on this store")]
    UnknownAction(String),

    /// The hook at `index` was called with a different type than on the
    /// previous render of the same mount.
    #[error("hook #{index} changed kind or type between renders")]
    HookMismatch { index: usize },

    /// A scheduling pass ran more than `limit` tasks without going idle.
    #[error("scheduling pass did not settle within {limit} tasks")]
    Unsettled { limit: usize },
}

/// Result alias used throughout the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;
