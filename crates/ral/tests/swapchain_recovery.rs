//! Transient swapchain errors are absorbed; fatal ones reach the caller

mod common;

use common::{empty_frame, headless};
use ral::prelude::*;

#[test]
fn test_out_of_date_at_acquire_skips_one_frame() {
    let mut device = headless(2);
    device.inject_out_of_date();

    assert!(device.begin_frame().unwrap().is_none());
    let stats = device.stats();
    assert_eq!(stats.swapchain_recreations, 1);
    assert_eq!(stats.skipped_frames, 1);
    assert_eq!(device.current_frame_index(), 0);

    empty_frame(&mut device);
    assert_eq!(device.stats().presents, 1);
}

#[test]
fn test_suboptimal_present_recreates_after_presenting() {
    let mut device = headless(2);
    device.inject_suboptimal_present();

    empty_frame(&mut device);
    let stats = device.stats();
    assert_eq!(stats.presents, 1);
    assert_eq!(stats.swapchain_recreations, 1);
    assert_eq!(stats.skipped_frames, 0);
}

#[test]
fn test_out_of_date_at_present_recreates_after_presenting() {
    let mut device = headless(2);
    device.inject_out_of_date_present();

    let cmd = device.begin_frame().unwrap().unwrap();
    device.end_frame(cmd).unwrap();
    let stats = device.stats();
    assert_eq!(stats.presents, 1);
    assert_eq!(stats.swapchain_recreations, 1);
    assert_eq!(stats.skipped_frames, 0);
    assert_eq!(device.current_frame_index(), 1);

    empty_frame(&mut device);
    assert_eq!(device.stats().presents, 2);
    assert_eq!(device.stats().swapchain_recreations, 1);
}

#[test]
fn test_device_lost_is_fatal() {
    let mut device = headless(2);
    let cmd = device.begin_frame().unwrap().unwrap();
    device.inject_device_lost();

    let err = device.end_frame(cmd).unwrap_err();
    assert!(err.is_fatal());
    assert!(matches!(err, RalError::Device { call: "vkQueueSubmit", .. }));
    assert!(device.wait_idle().unwrap_err().is_fatal());
}

#[test]
fn test_factory_device_follows_resize() {
    logging::init_for_tests();
    let config = RalConfig::new("resize")
        .with_graphics_api(GraphicsApi::Headless)
        .with_extent(640, 480);
    let mut device = create_device(&config, None).unwrap();
    assert_eq!(device.graphics_api(), GraphicsApi::Headless);
    assert_eq!(device.swapchain_extent(), Extent2D::new(640, 480));

    device.resize(1024, 768);
    empty_frame(device.as_mut());
    assert_eq!(device.swapchain_extent(), Extent2D::new(1024, 768));
}

#[test]
fn test_zero_extent_suspends_until_restored() {
    let mut device = headless(2);
    device.resize(0, 0);
    for _ in 0..3 {
        assert!(device.begin_frame().unwrap().is_none());
    }
    assert_eq!(device.stats().presents, 0);

    device.resize(320, 200);
    empty_frame(&mut device);
    assert_eq!(device.stats().presents, 1);
    assert_eq!(device.swapchain_extent(), Extent2D::new(320, 200));
}
