use tracing_subscriber::EnvFilter;

const DEBUG_SWITCH: &str = "COLDWATCH_DEBUG_LOG";

pub fn init() {
    let filter = build_filter(std::env::var(DEBUG_SWITCH).ok().as_deref());
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn build_filter(debug_switch: Option<&str>) -> EnvFilter {
    if debug_enabled(debug_switch) {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    }
}

fn debug_enabled(value: Option<&str>) -> bool {
    value.is_some_and(|value| matches!(value, "1" | "true" | "TRUE" | "yes" | "YES"))
}
