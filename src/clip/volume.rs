use std::fmt;

use glam::DVec3;

/// Direction used when a clip volume is created without one, or given a zero vector.
pub const DEFAULT_DIRECTION: DVec3 = DVec3::new(0.0, 0.0, -1.0);

/// Notification emitted whenever a clip volume changes in a way that affects rendering.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ClipVolumeEvent {
    Position(DVec3),
    Direction(DVec3),
    Active(bool),
}

impl ClipVolumeEvent {
    /// The event name a redraw scheduler subscribes to.
    pub fn name(&self) -> &'static str {
        match self {
            ClipVolumeEvent::Position(_) => "position",
            ClipVolumeEvent::Direction(_) => "direction",
            ClipVolumeEvent::Active(_) => "active",
        }
    }
}

/// Token returned by [`ClipVolume::on`], used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Listener = Box<dyn FnMut(&ClipVolumeEvent)>;

/// Initial state of a [`ClipVolume`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClipVolumeConfig {
    pub position: DVec3,
    pub direction: Option<DVec3>,
    pub active: bool,
}

impl Default for ClipVolumeConfig {
    fn default() -> Self {
        Self {
            position: DVec3::ZERO,
            direction: None,
            active: true,
        }
    }
}

/// An arbitrarily aligned World-space clipping plane.
///
/// Fragments in the half-space that `direction` points into are discarded.
/// `distance` is derived from `position` and `direction` and is kept in sync by
/// every setter; there is no way to set it directly.
///
/// ```
/// use glam::DVec3;
/// use instaclip::{ClipVolume, ClipVolumeConfig};
///
/// let volume = ClipVolume::new(ClipVolumeConfig {
///     position: DVec3::new(1.0, 1.0, 1.0),
///     direction: Some(DVec3::new(-1.0, -1.0, -1.0)),
///     active: true,
/// });
/// assert_eq!(volume.distance(), 3.0);
/// ```
pub struct ClipVolume {
    position: DVec3,
    direction: DVec3,
    distance: f64,
    active: bool,
    listeners: Vec<(ListenerId, Listener)>,
    next_listener_id: u64,
}

impl ClipVolume {
    pub fn new(config: ClipVolumeConfig) -> Self {
        let direction = sanitize_direction(config.direction);
        Self {
            position: config.position,
            direction,
            distance: signed_distance(config.position, direction),
            active: config.active,
            listeners: Vec::new(),
            next_listener_id: 0,
        }
    }

    pub fn position(&self) -> DVec3 {
        self.position
    }

    pub fn direction(&self) -> DVec3 {
        self.direction
    }

    /// Signed distance of the plane from the World origin, `-dot(position, direction)`.
    pub fn distance(&self) -> f64 {
        self.distance
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn set_position(&mut self, position: DVec3) {
        self.position = position;
        self.distance = signed_distance(self.position, self.direction);
        self.emit(ClipVolumeEvent::Position(self.position));
    }

    /// Sets the plane normal. `None` or a zero vector resets to [`DEFAULT_DIRECTION`].
    pub fn set_direction(&mut self, direction: Option<DVec3>) {
        self.direction = sanitize_direction(direction);
        self.distance = signed_distance(self.position, self.direction);
        self.emit(ClipVolumeEvent::Direction(self.direction));
    }

    pub fn set_active(&mut self, active: bool) {
        self.active = active;
        self.emit(ClipVolumeEvent::Active(self.active));
    }

    /// Inverts the plane normal. Negation is exact, so flipping twice restores
    /// both the direction and the distance bit for bit.
    pub fn flip(&mut self) {
        self.direction = -self.direction;
        self.distance = signed_distance(self.position, self.direction);
        self.emit(ClipVolumeEvent::Direction(self.direction));
    }

    /// Subscribes to change notifications. Each mutating call emits exactly one event.
    pub fn on(&mut self, listener: impl FnMut(&ClipVolumeEvent) + 'static) -> ListenerId {
        let id = ListenerId(self.next_listener_id);
        self.next_listener_id += 1;
        self.listeners.push((id, Box::new(listener)));
        id
    }

    /// Returns `false` if the listener was not subscribed.
    pub fn off(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(listener_id, _)| *listener_id != id);
        self.listeners.len() != before
    }

    fn emit(&mut self, event: ClipVolumeEvent) {
        for (_, listener) in self.listeners.iter_mut() {
            listener(&event);
        }
    }
}

impl Default for ClipVolume {
    fn default() -> Self {
        Self::new(ClipVolumeConfig::default())
    }
}

impl fmt::Debug for ClipVolume {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClipVolume")
            .field("position", &self.position)
            .field("direction", &self.direction)
            .field("distance", &self.distance)
            .field("active", &self.active)
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

fn sanitize_direction(direction: Option<DVec3>) -> DVec3 {
    match direction {
        Some(direction) if direction != DVec3::ZERO && direction.is_finite() => direction,
        _ => DEFAULT_DIRECTION,
    }
}

fn signed_distance(position: DVec3, direction: DVec3) -> f64 {
    -position.dot(direction)
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;

    fn volume(position: [f64; 3], direction: [f64; 3]) -> ClipVolume {
        ClipVolume::new(ClipVolumeConfig {
            position: DVec3::from_array(position),
            direction: Some(DVec3::from_array(direction)),
            active: true,
        })
    }

    #[test]
    fn diagonal_planes_sit_three_units_from_origin() {
        assert_eq!(volume([1.0, 1.0, 1.0], [-1.0, -1.0, -1.0]).distance(), 3.0);
        assert_eq!(volume([-1.0, -1.0, -1.0], [1.0, 1.0, 1.0]).distance(), 3.0);
    }

    #[test]
    fn setters_keep_distance_in_sync() {
        let mut clip = volume([0.0, 0.0, 0.0], [0.0, 1.0, 0.0]);
        clip.set_position(DVec3::new(4.0, -2.5, 7.0));
        assert_eq!(clip.distance(), -clip.position().dot(clip.direction()));

        clip.set_direction(Some(DVec3::new(0.3, -0.2, 0.9)));
        assert_eq!(clip.distance(), -clip.position().dot(clip.direction()));
    }

    #[test]
    fn missing_or_zero_direction_falls_back_to_default() {
        let mut clip = volume([1.0, 2.0, 3.0], [1.0, 0.0, 0.0]);
        clip.set_direction(None);
        assert_eq!(clip.direction(), DEFAULT_DIRECTION);
        clip.set_direction(Some(DVec3::ZERO));
        assert_eq!(clip.direction(), DEFAULT_DIRECTION);
        assert_eq!(clip.distance(), 3.0);
    }

    #[test]
    fn flipping_twice_is_exact() {
        let mut clip = volume([12.25, -3.5, 1e6], [0.1, 0.7, -0.3]);
        let direction = clip.direction();
        let distance = clip.distance();

        clip.flip();
        assert_eq!(clip.direction(), -direction);
        clip.flip();
        assert_eq!(clip.direction(), direction);
        assert_eq!(clip.distance(), distance);
    }

    #[test]
    fn each_mutation_emits_one_named_event() {
        let events = Rc::new(RefCell::new(Vec::new()));
        let mut clip = ClipVolume::default();
        let sink = events.clone();
        clip.on(move |event| sink.borrow_mut().push(event.name()));

        clip.set_position(DVec3::ONE);
        clip.set_direction(Some(DVec3::X));
        clip.set_active(false);
        clip.flip();

        assert_eq!(
            *events.borrow(),
            vec!["position", "direction", "active", "direction"]
        );
    }

    #[test]
    fn set_active_leaves_distance_alone() {
        let mut clip = volume([2.0, 0.0, 0.0], [1.0, 0.0, 0.0]);
        clip.set_active(false);
        assert!(!clip.is_active());
        assert_eq!(clip.distance(), -2.0);
    }

    #[test]
    fn unsubscribed_listener_stops_receiving() {
        let count = Rc::new(RefCell::new(0));
        let mut clip = ClipVolume::default();
        let sink = count.clone();
        let id = clip.on(move |_| *sink.borrow_mut() += 1);

        clip.set_active(false);
        assert!(clip.off(id));
        assert!(!clip.off(id));
        clip.set_active(true);

        assert_eq!(*count.borrow(), 1);
    }
}
