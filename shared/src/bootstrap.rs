use crate::config::OverviewConfig;
use crate::interaction::InteractionController;
use crate::render::SceneRenderer;
use crate::scale::PixelSize;
use crate::scene::Scene;

/// One live drawing surface: the scene, its renderer cache, and the
/// controller that owns pan/zoom and the tooltip.
#[derive(Debug)]
pub struct Surface {
    pub(crate) scene: Scene,
    pub(crate) renderer: SceneRenderer,
    pub(crate) controller: InteractionController,
}

impl Surface {
    /// Build a fresh surface sized to the container. `None` when there is no
    /// container or it has no area yet.
    pub fn create(container: Option<PixelSize>, config: &OverviewConfig) -> Option<Surface> {
        let Some(size) = container else {
            tracing::debug!("no container, surface not created");
            return None;
        };
        if size.is_empty() {
            tracing::debug!(width = size.width, height = size.height, "container has no area");
            return None;
        }
        tracing::info!(width = size.width, height = size.height, "surface created");
        Some(Surface {
            scene: Scene::new(size),
            renderer: SceneRenderer::new(config.clone()),
            controller: InteractionController::new(config.clone()),
        })
    }

    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    pub fn controller(&self) -> &InteractionController {
        &self.controller
    }

    pub fn size(&self) -> PixelSize {
        self.scene.size()
    }
}

/// Replace `slot` with a new surface for `container`. The previous surface is
/// always dropped first, so a failed bootstrap leaves no stale surface behind.
pub fn bootstrap(
    slot: &mut Option<Surface>,
    container: Option<PixelSize>,
    config: &OverviewConfig,
) -> bool {
    if slot.take().is_some() {
        tracing::debug!("dropping previous surface");
    }
    *slot = Surface::create(container, config);
    slot.is_some()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::LayerKind;
    use crate::transform::Transform;

    #[test]
    fn missing_or_empty_container_yields_nothing() {
        let config = OverviewConfig::default();
        assert!(Surface::create(None, &config).is_none());
        assert!(Surface::create(Some(PixelSize::new(0.0, 300.0)), &config).is_none());
        assert!(Surface::create(Some(PixelSize::new(f64::NAN, 300.0)), &config).is_none());
    }

    #[test]
    fn bootstrap_replaces_previous_surface() {
        let config = OverviewConfig::default();
        let mut slot = None;
        assert!(bootstrap(&mut slot, Some(PixelSize::new(640.0, 480.0)), &config));

        if let Some(surface) = slot.as_mut() {
            surface.controller.zoom_to(&mut surface.scene, 3.0);
            surface.scene.replace_layer(LayerKind::SelectedPoint, Vec::new());
            surface.scene.take_delta();
        }

        assert!(bootstrap(&mut slot, Some(PixelSize::new(320.0, 240.0)), &config));
        let surface = slot.as_mut().expect("surface");
        assert_eq!(surface.size(), PixelSize::new(320.0, 240.0));
        assert_eq!(surface.controller().transform(), Transform::IDENTITY);
        assert!(surface.scene.take_delta().full);

        assert!(!bootstrap(&mut slot, None, &config));
        assert!(slot.is_none());
    }
}
