use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};

use tessel_dtype::Precision;

use crate::allocator::RawBuffer;
use crate::{Allocator, CpuAllocator, Layout, Memory, MemoryDesc, Shape};

fn allocator() -> Arc<dyn Allocator> {
    Arc::new(CpuAllocator)
}

#[test]
fn test_lazy_allocation() {
    let desc = Arc::new(MemoryDesc::planar(Precision::F32, &[10]));
    let memory = Memory::new(allocator(), desc).unwrap();

    assert!(!memory.is_allocated());
    assert_eq!(memory.capacity(), 40);
    memory.read(|bytes| assert_eq!(bytes.len(), 40)).unwrap();
    assert!(memory.is_allocated());
}

#[test]
fn test_undefined_desc_rejected() {
    let desc = MemoryDesc::new(Precision::F32, Shape::new([crate::Dim::dynamic()]), Layout::Planar).unwrap();
    assert!(Memory::new(allocator(), Arc::new(desc)).is_err());
}

#[test]
fn test_values_follow_layout() {
    let dims = [1, 3, 2, 2];
    let values: Vec<f32> = (0..12).map(|v| v as f32).collect();
    let desc = Arc::new(MemoryDesc::new(Precision::F32, Shape::from_static(&dims), Layout::ChannelsLast).unwrap());
    let memory = Memory::from_values(allocator(), desc, &values).unwrap();

    // Physically the three channels of the first pixel come first
    let physical = memory.read(|bytes| (0..3).map(|i| Precision::F32.load(bytes, i)).collect::<Vec<_>>()).unwrap();
    assert_eq!(physical, vec![0.0, 4.0, 8.0]);
    assert_eq!(memory.to_values().unwrap(), values);
}

#[test]
fn test_from_slice_saturates_through_storage() {
    let memory = Memory::from_slice(allocator(), &[3], &[1u8, 2, 3]).unwrap();
    assert_eq!(memory.desc().precision(), Precision::U8);
    memory.write_values(&[-1.0, 300.0, 7.4]).unwrap();
    assert_eq!(memory.to_values().unwrap(), vec![0.0, 255.0, 7.0]);
}

#[test]
fn test_write_values_size_mismatch() {
    let memory = Memory::from_slice(allocator(), &[2], &[1.0f32, 2.0]).unwrap();
    assert!(memory.write_values(&[1.0]).is_err());
}

#[test]
fn test_with_desc_shares_allocation() {
    let memory = Memory::from_slice(allocator(), &[4], &[1.0f32, 2.0, 3.0, 4.0]).unwrap();
    let view = memory.with_desc(Arc::new(MemoryDesc::planar(Precision::F32, &[2]))).unwrap();
    assert!(view.same_buffer(&memory));
    assert_eq!(view.to_values().unwrap(), vec![1.0, 2.0]);
    assert!(memory.with_desc(Arc::new(MemoryDesc::planar(Precision::F32, &[5]))).is_err());
}

#[derive(Debug, Default)]
struct CountingAllocator {
    allocs: AtomicUsize,
    frees: AtomicUsize,
}

impl Allocator for CountingAllocator {
    fn alloc(&self, size: usize) -> crate::Result<RawBuffer> {
        self.allocs.fetch_add(1, Ordering::SeqCst);
        CpuAllocator.alloc(size)
    }

    fn free(&self, _buffer: RawBuffer) {
        self.frees.fetch_add(1, Ordering::SeqCst);
    }

    fn name(&self) -> &str {
        "counting"
    }
}

#[test]
fn test_concurrent_first_access_allocates_once() {
    const THREADS: usize = 8;

    let counting = Arc::new(CountingAllocator::default());
    let desc = Arc::new(MemoryDesc::planar(Precision::F32, &[64]));
    let memory = Memory::new(counting.clone(), desc).unwrap();
    let barrier = Barrier::new(THREADS);

    std::thread::scope(|s| {
        for _ in 0..THREADS {
            s.spawn(|| {
                barrier.wait();
                memory.read(|bytes| assert_eq!(bytes.len(), 256)).unwrap();
            });
        }
    });

    assert_eq!(counting.allocs.load(Ordering::SeqCst), 1);
    drop(memory);
    assert_eq!(counting.frees.load(Ordering::SeqCst), 1);
}
