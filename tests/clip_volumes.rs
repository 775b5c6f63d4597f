/// Clip-volume geometry and set membership, through the public API.
use std::cell::RefCell;
use std::rc::Rc;

use instaclip::glam::DVec3;
use instaclip::{ClipVolume, ClipVolumeConfig, ClipVolumeEvent, ClipVolumeSet};

fn volume(position: [f64; 3], direction: [f64; 3]) -> ClipVolume {
    ClipVolume::new(ClipVolumeConfig {
        position: DVec3::from_array(position),
        direction: Some(DVec3::from_array(direction)),
        active: true,
    })
}

#[test]
fn distance_tracks_every_setter() {
    let mut clip = volume([2.0, -3.0, 0.5], [0.0, 1.0, 0.0]);
    assert_eq!(clip.distance(), -clip.position().dot(clip.direction()));

    clip.set_position(DVec3::new(-7.0, 11.0, 4.0));
    assert_eq!(clip.distance(), -clip.position().dot(clip.direction()));

    clip.set_direction(Some(DVec3::new(0.3, -0.4, 0.5)));
    assert_eq!(clip.distance(), -clip.position().dot(clip.direction()));

    clip.set_active(false);
    assert_eq!(clip.distance(), -clip.position().dot(clip.direction()));
}

#[test]
fn diagonal_planes_sit_three_units_away() {
    assert_eq!(volume([1.0, 1.0, 1.0], [-1.0, -1.0, -1.0]).distance(), 3.0);
    assert_eq!(volume([-1.0, -1.0, -1.0], [1.0, 1.0, 1.0]).distance(), 3.0);
}

#[test]
fn double_flip_is_exact() {
    let mut clip = volume([0.1, 0.2, 0.3], [0.7, -0.2, 0.1]);
    let (direction, distance) = (clip.direction(), clip.distance());

    clip.flip();
    assert_eq!(clip.direction(), -direction);
    clip.flip();

    assert_eq!(clip.direction(), direction);
    assert_eq!(clip.distance(), distance);
}

#[test]
fn defaults_cut_towards_negative_z() {
    let clip = ClipVolume::default();
    assert!(clip.is_active());
    assert_eq!(clip.position(), DVec3::ZERO);
    assert_eq!(clip.direction(), DVec3::new(0.0, 0.0, -1.0));
    assert_eq!(clip.distance(), 0.0);
}

#[test]
fn each_mutation_emits_one_named_event() {
    let events = Rc::new(RefCell::new(Vec::new()));
    let mut clip = ClipVolume::default();
    let sink = events.clone();
    let listener = clip.on(move |event: &ClipVolumeEvent| sink.borrow_mut().push(event.name()));

    clip.set_position(DVec3::X);
    clip.set_direction(Some(DVec3::Y));
    clip.flip();
    clip.set_active(false);
    assert_eq!(
        *events.borrow(),
        vec!["position", "direction", "direction", "active"]
    );

    assert!(clip.off(listener));
    clip.set_active(true);
    assert_eq!(events.borrow().len(), 4);
}

#[test]
fn set_hash_follows_membership_only() {
    let mut set = ClipVolumeSet::new();
    let empty = set.hash();

    let a = set.add(volume([0.0, 0.0, 1.0], [0.0, 0.0, 1.0]));
    let b = set.add(ClipVolume::default());
    let two = set.hash();
    assert_ne!(empty, two);

    let member = set.get_mut(a).unwrap();
    member.set_position(DVec3::new(5.0, 5.0, 5.0));
    member.set_direction(None);
    member.flip();
    member.set_active(false);
    assert_eq!(set.hash(), two);

    assert!(set.remove(b).is_some());
    assert_ne!(set.hash(), two);
    assert!(set.remove(b).is_none());

    let order: Vec<_> = set.iter().map(|(id, _)| id).collect();
    assert_eq!(order, vec![a]);
}
