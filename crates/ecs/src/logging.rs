use log::Level;
use std::sync::Once;

pub(crate) const DEFAULT_LEVEL: Level = Level::Warn;

/// Initializes a default logger exactly once per process.
///
/// Safe to call from every [`Engine::new`](crate::Engine::new): only the first call has any
/// effect. Host applications that already configured a `log` backend are unaffected, since
/// this never runs outside of the `Once` guard and never overrides an already-installed
/// logger on platforms where `pretty_env_logger::try_init` detects one.
pub(crate) fn init() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        #[cfg(not(target_arch = "wasm32"))]
        {
            let _ = pretty_env_logger::formatted_builder()
                .filter_level(DEFAULT_LEVEL.to_level_filter())
                .try_init();
        }
    });
}
