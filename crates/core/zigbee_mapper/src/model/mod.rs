pub mod bridge_info;
pub mod device;
pub mod entity;
pub mod exposes;
pub mod group;

pub use bridge_info::BridgeInfo;
pub use device::BridgeDevice;
pub use device::DeviceType;
pub use entity::Availability;
pub use entity::DeviceTypeCode;
pub use entity::Entity;
pub use entity::EntitySource;
pub use exposes::Expose;
pub use exposes::Feature;
pub use group::BridgeGroup;
