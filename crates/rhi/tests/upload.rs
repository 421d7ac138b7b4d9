use rhi::headless::HeadlessBackend;
use rhi::{BufferDesc, BufferUsage, CommandListKind, Device, DeviceDesc, ResourceState};

fn device() -> Device<HeadlessBackend> {
    Device::new(HeadlessBackend::new(), &DeviceDesc::default())
}

#[test]
fn gpu_only_buffers_are_filled_through_staging() {
    let device = device();
    let data: Vec<u8> = (0..=255).collect();
    let buffer = device
        .create_buffer_with_data(&BufferDesc::gpu_only("vertices", 256, BufferUsage::VERTEX), &data)
        .unwrap();

    assert_eq!(HeadlessBackend::read_buffer(&buffer), data);
    assert_eq!(buffer.state(), ResourceState::VertexBuffer);
    let stats = device.backend().stats();
    assert_eq!(stats.copies, 1);
    assert_eq!(stats.bytes_copied, 256);
}

#[test]
fn upload_buffers_are_written_directly() {
    let device = device();
    let buffer = device
        .create_buffer_with_data(&BufferDesc::upload("constants", 16, BufferUsage::CONSTANT), &[7u8; 16])
        .unwrap();
    assert_eq!(HeadlessBackend::read_buffer(&buffer), vec![7u8; 16]);
    assert_eq!(device.backend().stats().submissions, 0);
}

#[test]
fn writes_to_gpu_only_or_past_the_end_are_ignored() {
    let device = device();
    let gpu = device.create_buffer(&BufferDesc::gpu_only("gpu", 8, BufferUsage::VERTEX)).unwrap();
    gpu.write(0, &[1, 2, 3, 4]);
    assert_eq!(HeadlessBackend::read_buffer(&gpu), vec![0; 8]);

    let upload = device.create_buffer(&BufferDesc::upload("up", 8, BufferUsage::VERTEX)).unwrap();
    upload.write(6, &[9, 9, 9, 9]);
    assert_eq!(HeadlessBackend::read_buffer(&upload), vec![0; 8]);
    upload.write_pod(4, &[0x0102_0304u32]);
    assert_eq!(&HeadlessBackend::read_buffer(&upload)[4..], &0x0102_0304u32.to_ne_bytes());
}

#[test]
fn zero_sized_buffers_are_rejected() {
    let device = device();
    assert!(device.create_buffer(&BufferDesc::upload("empty", 0, BufferUsage::VERTEX)).is_err());
}

#[test]
fn lists_execute_in_submission_order() {
    let device = device();
    let a = device.create_buffer_with_data(&BufferDesc::upload("a", 4, BufferUsage::COPY_SRC), &[1; 4]).unwrap();
    let b = device.create_buffer_with_data(&BufferDesc::upload("b", 4, BufferUsage::COPY_SRC), &[2; 4]).unwrap();
    let dst = device.create_buffer(&BufferDesc::gpu_only("dst", 4, BufferUsage::COPY_DST)).unwrap();

    let mut first = device.create_command_list(CommandListKind::Graphics, "first");
    first.begin();
    first.copy_buffer(&a, 0, &dst, 0, 4);
    first.end().unwrap();
    let mut second = device.create_command_list(CommandListKind::Graphics, "second");
    second.begin();
    second.copy_buffer(&b, 0, &dst, 0, 4);
    second.end().unwrap();

    device.submit(&mut [&mut first, &mut second]).unwrap();
    device.wait_idle();
    assert_eq!(HeadlessBackend::read_buffer(&dst), vec![2; 4]);
}
