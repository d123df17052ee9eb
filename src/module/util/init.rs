//! This module is responsible for preparing the resources needed by the application, such as directories, configurations, logs, etc.
//!

pub mod resource {
    use super::WeedtrackProperty;

    /// Initialize the application resources and return a WeedtrackProperty instance containing paths and configurations.
    ///
    pub fn init() -> Result<WeedtrackProperty, Box<dyn std::error::Error>> {
        // Prepare the app data directory
        let paths = crate::module::util::path::dir::create_app_sub_dir()?;

        // Load the app configuration file
        let conf = crate::module::util::conf::toml::load(&paths.dir.data)?;

        Ok(WeedtrackProperty { path: paths, conf })
    }
}

/// This struct represents the properties of the app, such as paths and configurations.
///
#[derive(Debug, Clone)]
pub struct WeedtrackProperty {
    pub path: crate::module::util::path::WeedtrackPath, // The paths of the app resources
    pub conf: crate::module::util::conf::Config,        // The configurations of the app
}
