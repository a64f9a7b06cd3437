//! Diagnostics for errors the engine cannot recover from.
//!
//! A fatal error on the audio thread leaves the graph in an unknown state, so the
//! process reports what it can and aborts instead of unwinding through a server
//! callback. [`install_fatal_handler`] routes panics through the same path.

use core::fmt;
use std::backtrace::Backtrace;
use std::sync::Once;

/// What was built and where it runs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BuildInfo {
    pub version: &'static str,
    pub profile: &'static str,
    pub arch: &'static str,
    pub os: &'static str,
}

impl BuildInfo {
    pub fn current() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION"),
            profile: if cfg!(debug_assertions) { "debug" } else { "release" },
            arch: std::env::consts::ARCH,
            os: std::env::consts::OS,
        }
    }
}

impl fmt::Display for BuildInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "klangnetz {} ({}, {}-{})",
            self.version, self.profile, self.arch, self.os
        )
    }
}

/// SIMD features the CPU reports at runtime.
pub fn cpu_features() -> Vec<&'static str> {
    #[allow(unused_mut)]
    let mut features = Vec::new();

    #[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
    {
        macro_rules! probe {
            ($($name:tt),*) => {
                $(if std::arch::is_x86_feature_detected!($name) {
                    features.push($name);
                })*
            };
        }
        probe!("sse2", "sse4.1", "avx", "avx2", "fma");
    }

    #[cfg(target_arch = "aarch64")]
    {
        if std::arch::is_aarch64_feature_detected!("neon") {
            features.push("neon");
        }
    }

    features
}

/// Log everything known about the failure and abort the process.
pub fn fatal(message: &dyn fmt::Display) -> ! {
    report(message, &Backtrace::force_capture());
    std::process::abort()
}

fn report(message: &dyn fmt::Display, backtrace: &Backtrace) {
    let features = cpu_features().join(",");
    tracing::error!(
        build = %BuildInfo::current(),
        cpu_features = %features,
        "fatal error: {message}"
    );
    tracing::error!("backtrace:\n{backtrace}");
}

static INSTALL: Once = Once::new();

/// Replace the panic hook with one that reports through [`fatal`].
///
/// Installing more than once has no further effect.
pub fn install_fatal_handler() {
    INSTALL.call_once(|| {
        std::panic::set_hook(Box::new(|info| {
            let thread = std::thread::current();
            let name = thread.name().unwrap_or("<unnamed>");
            fatal(&format_args!("thread '{name}' {info}"));
        }));
        tracing::debug!("fatal handler installed");
    });
}
