use crate::config::DeliveryMode;

#[derive(Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub delivery_mode: DeliveryMode,
    pub frontend_dir_path: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            port: 8080,
            delivery_mode: DeliveryMode::Upload,
            frontend_dir_path: None,
        }
    }
}
