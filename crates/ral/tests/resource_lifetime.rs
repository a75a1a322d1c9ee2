//! Handle validity and deferred native destruction

mod common;

use std::collections::HashSet;

use common::{draw_frame, empty_frame, headless, triangle};
use ral::prelude::*;

fn vertex_buffer(device: &mut dyn Device) -> BufferHandle {
    device
        .create_buffer(&BufferDescription::new(
            256,
            BufferUsage::VERTEX_BUFFER | BufferUsage::TRANSFER_DST,
            MemoryUsage::GpuOnly,
        ))
        .unwrap()
}

#[test]
fn test_destroyed_buffer_lookup_fails() {
    let mut device = headless(2);
    let buffer = vertex_buffer(&mut device);
    assert!(device.is_valid_buffer(buffer));
    assert_eq!(device.get_buffer(buffer).unwrap().size, 256);

    device.destroy_buffer(buffer);
    assert!(!device.is_valid_buffer(buffer));
    match device.get_buffer(buffer) {
        Err(RalError::InvalidHandle { kind, index, .. }) => {
            assert_eq!(kind, "buffer");
            assert_eq!(index, buffer.index());
        }
        other => panic!("expected an invalid handle error, got {other:?}"),
    }
}

#[test]
fn test_reused_slot_rejects_stale_handle() {
    let mut device = headless(2);
    let first = vertex_buffer(&mut device);
    device.destroy_buffer(first);

    let second = vertex_buffer(&mut device);
    assert_eq!(second.index(), first.index());
    assert_ne!(second.generation(), first.generation());
    assert!(!device.is_valid_buffer(first));
    assert!(device.is_valid_buffer(second));
}

#[test]
fn test_live_handles_are_unique() {
    let mut device = headless(2);
    let mut live: Vec<BufferHandle> = (0..64).map(|_| vertex_buffer(&mut device)).collect();
    for handle in live.iter().step_by(2) {
        device.destroy_buffer(*handle);
    }
    live.retain(|handle| device.is_valid_buffer(*handle));
    live.extend((0..32).map(|_| vertex_buffer(&mut device)));

    let unique: HashSet<BufferHandle> = live.iter().copied().collect();
    assert_eq!(unique.len(), 64);
    assert!(live.iter().all(|handle| device.is_valid_buffer(*handle)));
}

#[test]
fn test_double_destroy_defers_once() {
    let mut device = headless(2);
    let buffer = vertex_buffer(&mut device);
    device.destroy_buffer(buffer);
    device.destroy_buffer(buffer);
    assert_eq!(device.pending_deletions(0), 1);
}

#[test]
fn test_buffer_used_by_submitted_frame_outlives_its_handle() {
    let mut device = headless(2);
    let triangle = triangle(&mut device);

    draw_frame(&mut device, &triangle);
    device.destroy_buffer(triangle.vertices);
    assert!(!device.is_valid_buffer(triangle.vertices));
    assert_eq!(device.pending_deletions(0), 1);

    // slot 1 does not cover the submission that used the buffer
    empty_frame(&mut device);
    assert_eq!(device.stats().deletions_of("buffer"), 0);

    // reusing slot 0 waits on its fence, then frees
    empty_frame(&mut device);
    let stats = device.stats();
    assert_eq!(stats.deletions_of("buffer"), 1);
    let record = stats.deletions.iter().find(|d| d.kind == "buffer").unwrap();
    assert!(record.completed_serial >= record.last_use_serial.unwrap());
    assert_eq!(stats.premature_deletions, 0);
    assert_eq!(stats.use_after_free, 0);
}

#[test]
fn test_destroy_while_recording_keeps_recorded_reference() {
    let mut device = headless(2);
    let triangle = triangle(&mut device);

    let mut cmd = device.begin_frame().unwrap().unwrap();
    cmd.begin_render_pass(&RenderPassDescription::swapchain([0.0; 4])).unwrap();
    cmd.bind_pipeline(triangle.pipeline).unwrap();
    cmd.bind_vertex_buffer(0, triangle.vertices, 0).unwrap();
    cmd.draw(3, 1, 0, 0).unwrap();

    device.destroy_buffer(triangle.vertices);
    device.destroy_pipeline(triangle.pipeline);
    assert_eq!(device.pending_deletions(0), 2);

    // recorded commands still hold the native objects
    cmd.end_render_pass().unwrap();
    device.end_frame(cmd).unwrap();
    empty_frame(&mut device);
    empty_frame(&mut device);

    let stats = device.stats();
    assert_eq!(stats.draw_calls, 1);
    assert_eq!(stats.deletions_of("buffer"), 1);
    assert_eq!(stats.deletions_of("pipeline"), 1);
    assert_eq!(stats.use_after_free, 0);
    assert_eq!(stats.premature_deletions, 0);
}

#[test]
fn test_recording_with_destroyed_handle_fails() {
    let mut device = headless(2);
    let triangle = triangle(&mut device);
    device.destroy_buffer(triangle.vertices);

    let mut cmd = device.begin_frame().unwrap().unwrap();
    cmd.begin_render_pass(&RenderPassDescription::swapchain([0.0; 4])).unwrap();
    assert!(matches!(
        cmd.bind_vertex_buffer(0, triangle.vertices, 0),
        Err(RalError::InvalidHandle { .. })
    ));
    cmd.end_render_pass().unwrap();
    device.end_frame(cmd).unwrap();
}

#[test]
fn test_wait_idle_does_not_flush_early() {
    let mut device = headless(2);
    let triangle = triangle(&mut device);
    draw_frame(&mut device, &triangle);
    device.destroy_buffer(triangle.indices);

    device.wait_idle().unwrap();
    assert_eq!(device.pending_deletions(0), 1);
    assert_eq!(device.stats().deletions_of("buffer"), 0);
}
