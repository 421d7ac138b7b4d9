use std::time::{Duration, Instant};

use rhi::headless::HeadlessBackend;
use rhi::{CommandListKind, Device, DeviceDesc};

const DELAY: Duration = Duration::from_millis(150);

fn submit_frame(device: &Device<HeadlessBackend>, delay: Option<Duration>) {
    device.begin_frame();
    let mut list = device.create_command_list(CommandListKind::Graphics, "frame");
    list.begin();
    if let Some(delay) = delay {
        list.debug_delay(delay);
    }
    list.end().unwrap();
    device.submit_one(&mut list).unwrap();
    device.end_frame();
}

#[test]
fn third_frame_waits_for_the_first() {
    let device = Device::new(HeadlessBackend::new(), &DeviceDesc { frames_in_flight: 2 });

    let start = Instant::now();
    submit_frame(&device, Some(DELAY));

    // The second slot has never been used, so this returns at once.
    device.begin_frame();
    assert!(start.elapsed() < DELAY, "second frame blocked on the first");
    let mut list = device.create_command_list(CommandListKind::Graphics, "frame");
    list.begin();
    list.end().unwrap();
    device.submit_one(&mut list).unwrap();
    device.end_frame();

    // Back on slot 0: must wait for frame 1's GPU work.
    device.begin_frame();
    assert!(start.elapsed() >= DELAY, "third frame did not wait");
    assert!(device.frame_fence(0).completed_value() >= device.frame_fence_value(0));
}

#[test]
fn frame_slots_rotate_with_fresh_values() {
    let device = Device::new(HeadlessBackend::new(), &DeviceDesc { frames_in_flight: 3 });
    let mut values = Vec::new();
    for frame in 0..6 {
        assert_eq!(device.current_frame_index(), frame % 3);
        submit_frame(&device, None);
        values.push(device.frame_fence_value(frame % 3));
    }
    assert!(values.windows(2).all(|w| w[0] < w[1]));
    device.wait_idle();
    for slot in 0..3 {
        assert!(device.frame_fence(slot).completed_value() >= device.frame_fence_value(slot));
    }
}

#[test]
fn single_frame_in_flight_is_raised_to_two() {
    let device = Device::new(HeadlessBackend::new(), &DeviceDesc { frames_in_flight: 1 });
    assert_eq!(device.frames_in_flight(), 2);
}
