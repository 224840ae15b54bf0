use alloc::{
    string::{String, ToString},
    sync::Arc,
};

use config::device::DevId;
use downcast_rs::{impl_downcast, DowncastSync};

use crate::BlockDevice;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceMeta {
    /// Device id.
    pub dev_id: DevId,
    /// Name of the device.
    pub name: String,
}

impl DeviceMeta {
    pub fn new(dev_id: DevId, name: &str) -> Self {
        Self {
            dev_id,
            name: name.to_string(),
        }
    }
}

pub trait Device: Sync + Send + DowncastSync {
    fn meta(&self) -> &DeviceMeta;

    fn init(&self) {}

    fn dev_id(&self) -> DevId {
        self.meta().dev_id
    }

    fn name(&self) -> &str {
        &self.meta().name
    }

    /// Block-device view of this device, if it is one.
    fn as_blk(self: Arc<Self>) -> Option<Arc<dyn BlockDevice>> {
        None
    }
}

impl_downcast!(sync Device);
