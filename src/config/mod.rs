mod settings;

pub use settings::{
    ApiConfig, LogConfig, LogFormat, ServerConfig, Settings, ShutdownSettings, WebSocketConfig,
};
