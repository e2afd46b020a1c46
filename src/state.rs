use std::fmt;
use std::sync::Arc;

use crate::cache::VideoIndex;
use crate::config::Config;
use crate::mount::{EffectiveRoot, RootResolver};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub index: Arc<VideoIndex>,
    pub resolver: Arc<RootResolver>,
    pub root: EffectiveRoot,
}

impl fmt::Debug for AppState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppState").finish_non_exhaustive()
    }
}
