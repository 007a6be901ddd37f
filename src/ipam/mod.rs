pub mod allocator;

pub use allocator::{create_allocator, AddressAllocator, FixedAllocator, InfobloxAllocator};
