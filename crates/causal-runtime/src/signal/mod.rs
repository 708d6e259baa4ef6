//! Signal handling for sampling
//!
//! Uses SIGPROF on Unix systems to interrupt registered application threads
//! so the sampler can inspect their stacks.

cfg_if::cfg_if! {
    if #[cfg(unix)] {
        mod unix;
        pub use unix::*;
    } else {
        compile_error!("causal-runtime needs POSIX signals");
    }
}
