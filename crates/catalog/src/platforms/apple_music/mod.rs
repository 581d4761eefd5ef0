mod api;
pub mod models;

pub use api::{
    AppleMusicApi, AppleMusicConfig, DEFAULT_API_BASE, DEFAULT_WEB_BASE, DEFAULT_WEBPLAYBACK_URL,
};
