use crate::app::AppContext;
use axum::Router;

/// Trait for composable route modules
///
/// Each module returns a `Router<AppContext>`; state is applied once by
/// [`App`](crate::core::App). Handlers use `State<AppContext>`.
///
/// # Example
///
/// ```ignore
/// struct CronRoutes;
///
/// impl RouteModule for CronRoutes {
///     fn routes(&self) -> Router<AppContext> {
///         Router::new().route("/subscription-billing", get(run).post(run))
///     }
///
///     fn prefix(&self) -> Option<&str> {
///         Some("/api/cron")
///     }
/// }
/// ```
pub trait RouteModule {
    /// Returns a router with all routes for this module
    fn routes(&self) -> Router<AppContext>;

    /// Optional: specify a path prefix for all routes in this module
    fn prefix(&self) -> Option<&str> {
        None
    }

    /// Registers this module's routes into the application router
    fn register(self, router: Router<AppContext>) -> Router<AppContext>
    where
        Self: Sized,
    {
        let routes = self.routes();

        if let Some(prefix) = self.prefix() {
            router.nest(prefix, routes)
        } else {
            router.merge(routes)
        }
    }
}
