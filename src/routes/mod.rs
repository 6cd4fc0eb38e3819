//! HTTP surface of the billing service.

pub mod cron;
pub mod proforma;
pub mod settings;

pub use cron::CronRoutes;
pub use proforma::ProformaRoutes;
pub use settings::SettingsRoutes;

use crate::app::AppContext;
use crate::config::ServerConfig;
use crate::core::App;

/// The app with every billing route registered.
pub fn billing_app(server: ServerConfig, context: AppContext) -> App {
    App::new(server, context)
        .register_module(CronRoutes)
        .register_module(ProformaRoutes)
        .register_module(SettingsRoutes)
}
