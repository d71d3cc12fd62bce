use super::{LocationId, PushOutcome, SurfaceId, SurfacePlatform};
use crate::error::SurfaceError;
use crate::render::StatusCard;
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Surface platform that renders to stdout.
///
/// Backs the `watch`/`status` CLI modes and gives the coordinator a real
/// platform to drive without a chat SDK in the loop. A "surface" here is
/// just a remembered id; pushes reprint the card under its location
/// banner.
pub struct ConsoleSurface {
    surfaces: RwLock<HashMap<SurfaceId, LocationId>>,
}

impl ConsoleSurface {
    pub fn new() -> Self {
        Self {
            surfaces: RwLock::new(HashMap::new()),
        }
    }

    fn print_card(location: &LocationId, card: &StatusCard) {
        println!("[{location}]");
        println!("{}", card.body);
        if !card.actions.is_empty() {
            let labels: Vec<&str> = card.actions.iter().map(|a| a.as_str()).collect();
            println!("  actions: {}", labels.join(" | "));
        }
        println!();
    }
}

impl Default for ConsoleSurface {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SurfacePlatform for ConsoleSurface {
    async fn push(&self, surface: &SurfaceId, card: &StatusCard) -> PushOutcome {
        let surfaces = self.surfaces.read().await;
        match surfaces.get(surface) {
            Some(location) => {
                Self::print_card(location, card);
                PushOutcome::Ok
            }
            None => PushOutcome::NotFound,
        }
    }

    async fn create(
        &self,
        location: &LocationId,
        card: &StatusCard,
    ) -> Result<SurfaceId, SurfaceError> {
        let surface = SurfaceId::new(Uuid::new_v4().to_string());
        self.surfaces
            .write()
            .await
            .insert(surface.clone(), location.clone());
        Self::print_card(location, card);
        Ok(surface)
    }

    async fn delete_bot_content(
        &self,
        location: &LocationId,
        _limit: usize,
    ) -> Result<usize, SurfaceError> {
        let mut surfaces = self.surfaces.write().await;
        let before = surfaces.len();
        surfaces.retain(|_, loc| loc != location);
        Ok(before - surfaces.len())
    }

    async fn last_message_is_own(&self, _location: &LocationId) -> Result<bool, SurfaceError> {
        // A terminal has no competing authors; report "not ours" so
        // inactivity recreation keeps working end to end.
        Ok(false)
    }
}
