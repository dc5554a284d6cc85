//! Prefetching strategies for [`sectioned`] projections.
//!
//! The primary entry point of this library is [`Prefetcher`], with the
//! [`LinearPrefetcher`] and [`GreedyPrefetcher`] strategies.

mod prefetch;

pub use self::prefetch::{
    GreedyPrefetcher, LinearPrefetcher, Materializer, PrefetchError, Prefetcher,
};
