use glam::DVec3;
use stepsim_common::LinkId;
use stepsim_kernel::{CollisionEngine, CollisionError, ContactPoint, LinkPair, WorldState};

use crate::world::RigidWorld;

/// Radii of the two spheres in a registered pair, in pair order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpherePair {
    pub radius_a: f64,
    pub radius_b: f64,
}

/// Sphere-sphere narrow phase.
///
/// Reports at most one contact point per pair, at the midpoint of the
/// overlap. Overlaps no deeper than the pair's culling threshold are ignored.
#[derive(Debug, Clone, Copy, Default)]
pub struct SphereCollision;

impl SphereCollision {
    pub fn new() -> Self {
        Self
    }
}

fn radius(world: &RigidWorld, link: LinkId) -> Result<f64, CollisionError> {
    let r = world.link_radius(link).ok_or(CollisionError::MissingLink(link))?;
    if r.is_finite() && r > 0.0 {
        Ok(r)
    } else {
        Err(CollisionError::MalformedGeometry {
            link,
            reason: format!("radius {r}"),
        })
    }
}

impl CollisionEngine<RigidWorld> for SphereCollision {
    type Geometry = SpherePair;

    fn prepare(&mut self, world: &RigidWorld, a: LinkId, b: LinkId) -> Result<SpherePair, CollisionError> {
        Ok(SpherePair {
            radius_a: radius(world, a)?,
            radius_b: radius(world, b)?,
        })
    }

    fn detect(
        &self,
        state: &WorldState,
        pair: &LinkPair<SpherePair>,
    ) -> Result<Vec<ContactPoint>, CollisionError> {
        let pa = state
            .link(pair.a)
            .ok_or(CollisionError::MissingLink(pair.a))?
            .transform
            .position;
        let pb = state
            .link(pair.b)
            .ok_or(CollisionError::MissingLink(pair.b))?
            .transform
            .position;

        let delta = pb - pa;
        let distance = delta.length();
        if !distance.is_finite() {
            return Err(CollisionError::Engine(format!(
                "non-finite link positions in {}",
                pair.label()
            )));
        }
        let SpherePair { radius_a, radius_b } = pair.geometry;
        let depth = radius_a + radius_b - distance;
        if depth <= pair.params.culling_threshold {
            return Ok(Vec::new());
        }

        let normal = if distance > 1.0e-9 { delta / distance } else { DVec3::Z };
        // Midpoint between the two surface points along the normal.
        let position = pa + normal * (radius_a - depth * 0.5);
        Ok(vec![ContactPoint {
            position,
            normal,
            depth,
        }])
    }
}
