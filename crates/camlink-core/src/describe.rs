//! Natural-language description of a camera view
//!
//! Turns a camera position into the angle, shot and label strings emitted as
//! node outputs. All angles are measured from the orbit target, so they agree
//! with what the render surface shows.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};

use crate::camera::{CameraState, ORBIT_TARGET};

/// Zoom mapping distance limits (match the orbit controls)
const MIN_DISTANCE: f64 = 2.0;
const MAX_DISTANCE: f64 = 20.0;
const ZOOM_GAMMA: f64 = 1.8;

/// Height above/below the target that counts as an upper/lower view
const VERTICAL_THRESHOLD: f64 = 0.5;

/// Cached descriptions kept per node
pub const DESCRIPTION_CACHE_SIZE: usize = 50;

/// Outputs produced for one camera state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewDescription {
    /// Location, angles and FOV in one line
    pub prompt: String,
    pub view_label: String,
    pub direction_degrees: String,
    pub distance_description: String,
    pub angle_description: String,
    pub horizontal_angle: f64,
    pub vertical_angle: f64,
    pub zoom: f64,
}

/// 45-degree sector around the target, clockwise from the front
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Octant {
    Front,
    FrontRight,
    Right,
    BackRight,
    Back,
    BackLeft,
    Left,
    FrontLeft,
}

impl Octant {
    pub const ALL: [Octant; 8] = [
        Self::Front,
        Self::FrontRight,
        Self::Right,
        Self::BackRight,
        Self::Back,
        Self::BackLeft,
        Self::Left,
        Self::FrontLeft,
    ];

    /// Sector containing a horizontal angle in [0, 360)
    pub fn from_angle(angle: f64) -> Self {
        if !(22.5..337.5).contains(&angle) {
            return Self::Front;
        }
        let index = ((angle - 22.5) / 45.0).floor() as usize + 1;
        Self::ALL[index.min(7)]
    }

    /// Long form used in shot descriptions
    pub fn direction(self) -> &'static str {
        match self {
            Self::Front => "front",
            Self::FrontRight => "front-right",
            Self::Right => "right side",
            Self::BackRight => "back-right",
            Self::Back => "back",
            Self::BackLeft => "back-left",
            Self::Left => "left side",
            Self::FrontLeft => "front-left",
        }
    }

    /// Short form used in view labels
    pub fn label(self) -> &'static str {
        match self {
            Self::Right => "right",
            Self::Left => "left",
            other => other.direction(),
        }
    }

    pub fn center(self) -> f64 {
        Self::ALL.iter().position(|o| *o == self).unwrap_or(0) as f64 * 45.0
    }

    /// Dominant axis: right/left win over front/back
    fn primary_axis(self) -> &'static str {
        let direction = self.direction();
        if direction.contains("right") {
            "right"
        } else if direction.contains("left") {
            "left"
        } else if direction.contains("front") {
            "front"
        } else {
            "back"
        }
    }
}

pub fn vertical_shot(vertical_angle: f64) -> &'static str {
    if vertical_angle < -60.0 {
        "bottom-up view"
    } else if vertical_angle < -15.0 {
        "low-angle shot"
    } else if vertical_angle < 15.0 {
        "eye-level shot"
    } else if vertical_angle < 60.0 {
        "elevated shot"
    } else if vertical_angle < 85.0 {
        "high-angle shot"
    } else {
        "top-down view"
    }
}

pub fn distance_shot(zoom: f64) -> &'static str {
    if zoom < 2.0 {
        "wide shot"
    } else if zoom < 4.0 {
        "medium shot"
    } else if zoom < 6.0 {
        "close shot"
    } else {
        "close-up"
    }
}

/// Map camera distance to a 0..=10 zoom level (10 is closest)
pub fn zoom_level(distance: f64) -> f64 {
    let d = distance.clamp(MIN_DISTANCE, MAX_DISTANCE);
    let t = (d - MIN_DISTANCE) / (MAX_DISTANCE - MIN_DISTANCE);
    ((1.0 - t).powf(ZOOM_GAMMA) * 10.0).clamp(0.0, 10.0)
}

fn angular_diff(a: f64, b: f64) -> f64 {
    ((a - b + 180.0).rem_euclid(360.0) - 180.0).abs()
}

/// Describe the view from `state`. Inputs are clamped to their UI domains first.
pub fn describe(state: &CameraState) -> ViewDescription {
    let state = state.clamped();
    let [x, y, z] = state.position();
    let dx = x - ORBIT_TARGET[0];
    let dy = y - ORBIT_TARGET[1];
    let dz = z - ORBIT_TARGET[2];

    let mut horizontal_angle = dx.atan2(dz).to_degrees().rem_euclid(360.0);
    if horizontal_angle >= 360.0 {
        horizontal_angle = 0.0;
    }
    let dist_xz = (dx * dx + dz * dz).sqrt();
    let vertical_angle = dy.atan2(dist_xz).to_degrees();
    let distance = (dx * dx + dy * dy + dz * dz).sqrt();
    let zoom = zoom_level(distance);

    let octant = Octant::from_angle(horizontal_angle);
    let angle_description = vertical_shot(vertical_angle);
    let distance_description = distance_shot(zoom);

    let prompt = format!(
        "Location: X:{x:.2}, Y:{y:.2}, Z:{z:.2}; Horizontal angle: {horizontal_angle:.2}°; \
         Vertical angle: {vertical_angle:.2}°; FOV: {:.1}",
        state.field_of_view
    );

    let vertical_label = if vertical_angle >= 85.0 {
        "top-down"
    } else if vertical_angle <= -60.0 {
        "bottom-up"
    } else if dy > VERTICAL_THRESHOLD {
        "upper"
    } else if dy < -VERTICAL_THRESHOLD {
        "lower"
    } else {
        ""
    };
    let view_label = if vertical_label.is_empty() {
        octant.label().to_string()
    } else {
        format!("{}-{}", vertical_label, octant.primary_axis())
    };

    let closest = Octant::ALL
        .into_iter()
        .min_by(|a, b| {
            angular_diff(horizontal_angle, a.center())
                .total_cmp(&angular_diff(horizontal_angle, b.center()))
        })
        .unwrap_or(Octant::Front);
    let direction_degrees = format!(
        "{}: {:.2}°",
        closest.label(),
        angular_diff(horizontal_angle, closest.center())
    );

    ViewDescription {
        prompt,
        view_label,
        direction_degrees,
        distance_description: distance_description.to_string(),
        angle_description: angle_description.to_string(),
        horizontal_angle,
        vertical_angle,
        zoom,
    }
}

/// Per-node cache of the last description, bounded with oldest-first eviction
#[derive(Debug)]
pub struct DescriptionCache {
    capacity: usize,
    entries: HashMap<String, (CameraState, ViewDescription)>,
    order: VecDeque<String>,
    hits: u64,
}

impl DescriptionCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: HashMap::new(),
            order: VecDeque::new(),
            hits: 0,
        }
    }

    /// Return the cached description for `node` if its inputs are unchanged,
    /// otherwise compute and store a new one. A missing node id shares the
    /// `default` slot.
    pub fn describe(&mut self, node: Option<&str>, state: &CameraState) -> ViewDescription {
        let key = node.unwrap_or("default").to_string();
        let inputs = state.clamped();

        if let Some((cached_inputs, description)) = self.entries.get(&key) {
            if *cached_inputs == inputs {
                self.hits += 1;
                return description.clone();
            }
        }

        let description = describe(&inputs);
        if self
            .entries
            .insert(key.clone(), (inputs, description.clone()))
            .is_none()
        {
            self.order.push_back(key);
        }
        while self.entries.len() > self.capacity {
            match self.order.pop_front() {
                Some(oldest) => {
                    self.entries.remove(&oldest);
                }
                None => break,
            }
        }
        description
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, node: &str) -> bool {
        self.entries.contains_key(node)
    }

    /// Number of lookups answered from the cache
    pub fn hits(&self) -> u64 {
        self.hits
    }
}

impl Default for DescriptionCache {
    fn default() -> Self {
        Self::new(DESCRIPTION_CACHE_SIZE)
    }
}
