//! Backend detection and auto-selection.

use super::Backend;

/// Environment variable forcing the backend chosen by [`Backend::Auto`].
pub const BACKEND_ENV: &str = "GPUFX_BACKEND";

/// One row of the backend listing.
#[derive(Debug, Clone)]
pub struct BackendInfo {
    pub backend: Backend,
    pub name: &'static str,
    /// A context can be created right now.
    pub available: bool,
    /// Auto-selection rank, highest wins.
    pub priority: u32,
    pub description: &'static str,
}

/// Lists every backend compiled in, preferred first.
pub fn detect_backends() -> Vec<BackendInfo> {
    #[allow(unused_mut)]
    let mut backends = vec![BackendInfo {
        backend: Backend::Cpu,
        name: "CPU",
        available: true,
        priority: 10,
        description: "Software reference context with rayon parallelization",
    }];

    #[cfg(feature = "wgpu")]
    {
        let wgpu_available = super::WgpuContext::is_available();
        backends.push(BackendInfo {
            backend: Backend::Wgpu,
            name: "wgpu",
            available: wgpu_available,
            priority: if wgpu_available { 100 } else { 0 },
            description: "GPU render pipelines via wgpu (Vulkan/Metal/DX12)",
        });
    }

    backends.sort_by(|a, b| b.priority.cmp(&a.priority));
    backends
}

/// Select the backend used for [`Backend::Auto`].
///
/// `GPUFX_BACKEND=cpu|wgpu` wins when that backend is available.
pub fn select_best_backend() -> Backend {
    if let Ok(name) = std::env::var(BACKEND_ENV) {
        match name.parse::<Backend>() {
            Ok(Backend::Auto) => {}
            Ok(forced) if forced.is_available() => return forced,
            Ok(forced) => {
                tracing::warn!(target: gpufx_core::log::target::CONFIG, backend = %forced, "{BACKEND_ENV} backend not available, auto-selecting");
            }
            Err(e) => {
                tracing::warn!(target: gpufx_core::log::target::CONFIG, "{BACKEND_ENV}: {e}");
            }
        }
    }

    detect_backends()
        .into_iter()
        .filter(|b| b.available)
        .max_by_key(|b| b.priority)
        .map(|b| b.backend)
        .unwrap_or(Backend::Cpu)
}

/// `[+]`/`[-]` listing of the compiled-in backends, one per line.
pub fn describe_backends() -> String {
    detect_backends()
        .iter()
        .map(|info| {
            let mark = if info.available { '+' } else { '-' };
            format!("[{mark}] {}: {}\n", info.name, info.description)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cpu_always_listed() {
        let backends = detect_backends();
        assert!(backends.iter().any(|b| b.backend == Backend::Cpu && b.available));
        assert!(describe_backends().contains("[+] CPU"));
    }
}
