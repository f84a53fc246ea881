pub mod api;

/// Navigation targets the library asks the UI shell to open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Login / signup entry point.
    Auth,
    /// Main tabbed app.
    Main,
}

impl Route {
    pub fn path(&self) -> &'static str {
        match self {
            Route::Auth => "/(auth)/login",
            Route::Main => "/(tabs)",
        }
    }
}
