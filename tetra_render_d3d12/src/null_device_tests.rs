//! Unit tests for NullDx12Device
//!
//! The renderer tests lean on these rules, so they are pinned here first.

use super::*;
use crate::d3d12_convert::DXGI_ERROR_DEVICE_REMOVED;

fn open_list(device: &NullDx12Device) -> (NativeHandle, NativeHandle) {
    let allocator = device.create_command_allocator(QueueKind::Direct).unwrap();
    let list = device.create_command_list(QueueKind::Direct, allocator).unwrap();
    device.reset_command_list(list, allocator).unwrap();
    (allocator, list)
}

// ============================================================================
// FENCES
// ============================================================================

#[test]
fn test_signal_completes_immediately_without_lag() {
    let device = NullDx12Device::new();
    let fence = device.create_fence(0).unwrap();
    device.signal(QueueKind::Direct, fence, 1).unwrap();
    assert_eq!(device.completed_value(fence), 1);
}

#[test]
fn test_signal_completes_after_lag() {
    let device = NullDx12Device::new().with_lag(2);
    let fence = device.create_fence(0).unwrap();
    device.signal(QueueKind::Direct, fence, 1).unwrap();
    assert_eq!(device.completed_value(fence), 0);
    device.signal(QueueKind::Direct, fence, 2).unwrap();
    assert_eq!(device.completed_value(fence), 0);
    device.signal(QueueKind::Direct, fence, 3).unwrap();
    assert_eq!(device.completed_value(fence), 1);
}

#[test]
fn test_wait_blocks_until_value_completes() {
    let device = NullDx12Device::new().with_lag(3);
    let fence = device.create_fence(0).unwrap();
    device.signal(QueueKind::Direct, fence, 1).unwrap();
    device.signal(QueueKind::Direct, fence, 2).unwrap();

    assert_eq!(device.wait_for_value(fence, 1, u32::MAX), Ok(true));
    assert_eq!(device.completed_value(fence), 1);
    assert_eq!(device.counters().blocking_waits, 1);

    // Already reached: no further blocking
    assert_eq!(device.wait_for_value(fence, 1, u32::MAX), Ok(true));
    assert_eq!(device.counters().blocking_waits, 1);
}

#[test]
fn test_zero_timeout_polls() {
    let device = NullDx12Device::new().with_lag(1);
    let fence = device.create_fence(0).unwrap();
    device.signal(QueueKind::Direct, fence, 1).unwrap();
    assert_eq!(device.wait_for_value(fence, 1, 0), Ok(false));
    assert_eq!(device.counters().blocking_waits, 0);
}

#[test]
fn test_wait_for_unsignalled_value_is_reported() {
    let device = NullDx12Device::new();
    let fence = device.create_fence(0).unwrap();
    assert_eq!(device.wait_for_value(fence, 5, 100), Ok(false));
    assert_eq!(device.violations().len(), 1);
}

// ============================================================================
// COMMAND LISTS
// ============================================================================

#[test]
fn test_allocator_reset_while_executing_fails() {
    let device = NullDx12Device::new().with_lag(2);
    let fence = device.create_fence(0).unwrap();
    let (allocator, list) = open_list(&device);
    device.close_command_list(list).unwrap();
    device.execute_command_list(QueueKind::Direct, list).unwrap();
    device.signal(QueueKind::Direct, fence, 1).unwrap();

    assert_eq!(device.reset_command_allocator(allocator), Err(E_FAIL));
    assert_eq!(device.violations().len(), 1);

    device.wait_for_value(fence, 1, u32::MAX).unwrap();
    assert_eq!(device.reset_command_allocator(allocator), Ok(()));
}

#[test]
fn test_allocator_reset_after_unfenced_execute_fails() {
    let device = NullDx12Device::new();
    let (allocator, list) = open_list(&device);
    device.close_command_list(list).unwrap();
    device.execute_command_list(QueueKind::Direct, list).unwrap();
    assert_eq!(device.reset_command_allocator(allocator), Err(E_FAIL));
}

#[test]
fn test_execute_of_open_list_fails() {
    let device = NullDx12Device::new();
    let (_, list) = open_list(&device);
    assert_eq!(device.execute_command_list(QueueKind::Direct, list), Err(E_FAIL));
    assert!(!device.violations().is_empty());
}

#[test]
fn test_draw_without_pipeline_is_reported() {
    let device = NullDx12Device::new();
    let (_, list) = open_list(&device);
    device.record(list, ListCommand::DrawInstanced { vertex_count: 3, instance_count: 1 });
    assert_eq!(device.violations().len(), 1);
}

#[test]
fn test_executed_lists_are_captured() {
    let device = NullDx12Device::new();
    let (_, list) = open_list(&device);
    device.record(list, ListCommand::SetGraphicsRootSignature(NativeHandle(99)));
    device.record(list, ListCommand::SetPipelineState(NativeHandle(98)));
    device.record(list, ListCommand::DrawInstanced { vertex_count: 3, instance_count: 1 });
    device.close_command_list(list).unwrap();
    device.execute_command_list(QueueKind::Direct, list).unwrap();

    let submissions = device.take_submissions();
    assert_eq!(submissions.len(), 1);
    assert_eq!(submissions[0].queue, QueueKind::Direct);
    assert_eq!(submissions[0].draws(), 1);
    assert!(device.violations().is_empty());
}

#[test]
fn test_recording_into_closed_list_is_dropped() {
    let device = NullDx12Device::new();
    let allocator = device.create_command_allocator(QueueKind::Direct).unwrap();
    let list = device.create_command_list(QueueKind::Direct, allocator).unwrap();
    device.record(list, ListCommand::SetViewport { width: 1, height: 1 });
    assert_eq!(device.violations().len(), 1);
}

// ============================================================================
// OBJECTS AND SWAPCHAIN
// ============================================================================

#[test]
fn test_release_balances_creation() {
    let device = NullDx12Device::new();
    let buffer = device
        .create_committed_resource("b", HeapKind::Upload, &ResourceDesc::Buffer { size: 64 }, ResourceState::GenericRead)
        .unwrap();
    let view = device
        .create_view(buffer, ViewKind::ShaderResource { format: 28, cube: false })
        .unwrap();
    assert_eq!(device.live_objects(), 2);
    device.release(view);
    device.release(buffer);
    assert_eq!(device.live_objects(), 0);

    device.release(buffer);
    assert_eq!(device.violations().len(), 1);
}

#[test]
fn test_upload_heap_writes_are_bounds_checked() {
    let device = NullDx12Device::new();
    let buffer = device
        .create_committed_resource("b", HeapKind::Upload, &ResourceDesc::Buffer { size: 8 }, ResourceState::GenericRead)
        .unwrap();
    device.write_buffer(buffer, 4, &[1, 2, 3, 4]).unwrap();
    assert_eq!(device.upload_contents(buffer), Some(vec![0, 0, 0, 0, 1, 2, 3, 4]));
    assert_eq!(device.write_buffer(buffer, 6, &[1, 2, 3]), Err(E_INVALIDARG));
}

#[test]
fn test_injected_allocation_failure() {
    let device = NullDx12Device::new();
    device.fail_next_allocation(crate::d3d12_convert::E_OUTOFMEMORY);
    let result = device.create_committed_resource(
        "b",
        HeapKind::Default,
        &ResourceDesc::Buffer { size: 8 },
        ResourceState::Common,
    );
    assert_eq!(result, Err(crate::d3d12_convert::E_OUTOFMEMORY));
}

#[test]
fn test_resize_requires_released_back_buffers() {
    let device = NullDx12Device::new();
    let swapchain = device
        .create_swapchain(&SwapchainDesc { width: 640, height: 480, buffer_count: 2, format: 28 })
        .unwrap();
    let back_buffer = device.swapchain_buffer(swapchain, 0).unwrap();

    assert_eq!(device.resize_buffers(swapchain, 800, 600), Err(DXGI_ERROR_INVALID_CALL));
    device.release(back_buffer);
    assert_eq!(device.resize_buffers(swapchain, 800, 600), Ok(()));
    assert_eq!(device.swapchain_extent(swapchain), Some((800, 600)));
}

#[test]
fn test_present_rotates_back_buffers() {
    let device = NullDx12Device::new();
    let swapchain = device
        .create_swapchain(&SwapchainDesc { width: 64, height: 64, buffer_count: 3, format: 28 })
        .unwrap();
    let indices: Vec<u32> = (0..4)
        .map(|_| {
            let index = device.current_back_buffer_index(swapchain);
            device.present(swapchain, 1).unwrap();
            index
        })
        .collect();
    assert_eq!(indices, vec![0, 1, 2, 0]);
}

#[test]
fn test_injected_present_failure() {
    let device = NullDx12Device::new();
    let swapchain = device
        .create_swapchain(&SwapchainDesc { width: 64, height: 64, buffer_count: 2, format: 28 })
        .unwrap();
    device.fail_next_present(DXGI_ERROR_DEVICE_REMOVED);
    assert_eq!(device.present(swapchain, 1), Err(DXGI_ERROR_DEVICE_REMOVED));
    assert_eq!(device.present(swapchain, 1), Ok(()));
}
