//! Frames in flight: when `begin_frame` waits and what it waits for

mod common;

use common::{draw_frame, empty_frame, headless, triangle};
use ral::prelude::*;

#[test]
fn test_third_frame_waits_with_two_in_flight() {
    let mut device = headless(2);
    let triangle = triangle(&mut device);

    draw_frame(&mut device, &triangle);
    draw_frame(&mut device, &triangle);
    assert_eq!(device.stats().fence_waits, 0);
    assert_eq!(device.current_frame_index(), 0);

    draw_frame(&mut device, &triangle);
    let stats = device.stats();
    assert_eq!(stats.fence_waits, 1);
    assert_eq!(stats.blocking_fence_waits, 1);
    assert_eq!(stats.draw_calls, 3);
    assert_eq!(stats.submissions, 3);
    assert_eq!(stats.presents, 3);
}

#[test]
fn test_finished_gpu_makes_wait_non_blocking() {
    let mut device = headless(2);
    empty_frame(&mut device);
    empty_frame(&mut device);
    device.let_gpu_catch_up();

    empty_frame(&mut device);
    let stats = device.stats();
    assert_eq!(stats.fence_waits, 1);
    assert_eq!(stats.blocking_fence_waits, 0);
}

#[test]
fn test_cpu_runs_at_most_n_frames_ahead() {
    let mut device = headless(3);
    for _ in 0..3 {
        empty_frame(&mut device);
    }
    assert_eq!(device.stats().fence_waits, 0);

    for expected in 1..=6 {
        empty_frame(&mut device);
        assert_eq!(device.stats().fence_waits, expected);
    }
}

#[test]
fn test_begin_frame_twice_is_rejected() {
    let mut device = headless(2);
    let cmd = device.begin_frame().unwrap().unwrap();
    assert!(matches!(device.begin_frame(), Err(RalError::InvalidOperation { .. })));

    device.end_frame(cmd).unwrap();
    assert_eq!(device.current_frame_index(), 1);
}

#[test]
fn test_slot_index_wraps() {
    let mut device = headless(2);
    let indices: Vec<usize> = (0..5)
        .map(|_| {
            let index = device.current_frame_index();
            empty_frame(&mut device);
            index
        })
        .collect();
    assert_eq!(indices, vec![0, 1, 0, 1, 0]);
    assert_eq!(device.frames_in_flight(), 2);
}
