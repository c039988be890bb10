//! Survey pattern generation around a centre point.

use drone_domain::{MissionTemplate, Position, Waypoint, WaypointAction};

/// Builds mission templates for common survey shapes.
#[derive(Debug, Clone, Copy)]
pub struct PatternGenerator {
    center: Position,
    altitude_m: f64,
}

impl PatternGenerator {
    pub fn new(center: Position, altitude_m: f64) -> Self {
        Self { center, altitude_m }
    }

    /// Evenly spaced points on a circle, photographing at each one.
    pub fn perimeter(&self, name: &str, radius_m: f64, points: usize) -> MissionTemplate {
        let points = points.max(3);
        let waypoints = (0..points)
            .map(|i| {
                let angle = std::f64::consts::TAU * i as f64 / points as f64;
                let east = radius_m * angle.sin();
                let north = radius_m * angle.cos();
                self.waypoint(east, north, WaypointAction::Photo)
            })
            .collect();

        MissionTemplate {
            name: name.to_string(),
            waypoints,
        }
    }

    /// Back-and-forth lanes over a `width_m` x `height_m` box.
    /// Records video and scans for objects for the whole sweep.
    pub fn lawnmower(
        &self,
        name: &str,
        width_m: f64,
        height_m: f64,
        lanes: usize,
    ) -> MissionTemplate {
        let lanes = lanes.max(1);
        let spacing = if lanes > 1 {
            width_m / (lanes - 1) as f64
        } else {
            0.0
        };
        let west = -width_m / 2.0;
        let south = -height_m / 2.0;

        let mut waypoints = Vec::with_capacity(lanes * 2 + 1);
        for lane in 0..lanes {
            let east = west + spacing * lane as f64;
            let (start, end) = if lane % 2 == 0 {
                (south, south + height_m)
            } else {
                (south + height_m, south)
            };

            let entry = if lane == 0 {
                WaypointAction::VideoStart
            } else {
                WaypointAction::Navigate
            };
            waypoints.push(self.waypoint(east, start, entry));
            waypoints.push(self.waypoint(east, end, WaypointAction::Photo));
        }
        if let Some(first) = waypoints.get_mut(1) {
            first.action = WaypointAction::DetectObjects;
        }
        if let Some(last) = waypoints.last().copied() {
            waypoints.push(Waypoint {
                action: WaypointAction::VideoStop,
                ..last
            });
        }

        MissionTemplate {
            name: name.to_string(),
            waypoints,
        }
    }

    fn waypoint(&self, east_m: f64, north_m: f64, action: WaypointAction) -> Waypoint {
        let position = self.center.displaced(east_m, north_m, self.altitude_m);
        Waypoint::new(position.lat, position.lng, position.alt_m, action)
    }
}
