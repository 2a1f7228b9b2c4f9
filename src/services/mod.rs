pub mod cache;
pub mod gateway;
pub mod rendering;

// Re-export commonly used services
pub use cache::{FilePageCache, MemoryPageCache, PageCache};
pub use gateway::{OverlayCompositor, RegionDetector, RegionTranslator};
pub use rendering::PlateCompositor;
