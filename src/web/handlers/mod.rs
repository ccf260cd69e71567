use axum::Router;
use std::sync::Arc;
use crate::AppContext;

pub mod progress;
pub mod video;

pub fn router(ctx: Arc<AppContext>) -> Router {
    Router::new()
        .merge(video::video_router(ctx.clone()))
        .merge(progress::progress_router(ctx))
}
