use crate::routes::Route;

/// The UI side of the app: where to navigate and how to show a blocking
/// notice. The library never renders anything itself.
pub trait AppShell: Send + Sync {
    fn navigate(&self, route: Route);
    fn alert(&self, title: &str, message: &str);
}

/// Headless shell for the CLI and background use: everything goes to the log.
#[derive(Debug, Default)]
pub struct TracingShell;

impl AppShell for TracingShell {
    fn navigate(&self, route: Route) {
        tracing::info!("navigate -> {}", route.path());
    }

    fn alert(&self, title: &str, message: &str) {
        tracing::warn!("{}: {}", title, message);
    }
}
