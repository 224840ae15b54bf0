use alloc::{collections::btree_map::BTreeMap, sync::Arc};

use config::device::DevId;
use mutex::SpinNoIrqLock;

use crate::{device::Device, BlockDevice};

/// The DeviceManager struct is responsible for managing the devices within
/// the system. The caches resolve every device id through it, so a lookup
/// miss is how an unmounted or never-registered device surfaces.
pub struct DeviceManager {
    devices: SpinNoIrqLock<BTreeMap<DevId, Arc<dyn Device>>>,
}

impl DeviceManager {
    pub fn new() -> Self {
        Self {
            devices: SpinNoIrqLock::new(BTreeMap::new()),
        }
    }

    pub fn register(&self, device: Arc<dyn Device>) {
        log::info!(
            "[DeviceManager::register] device {} at {:?}",
            device.name(),
            device.dev_id()
        );
        device.init();
        self.devices.lock().insert(device.dev_id(), device);
    }

    pub fn get(&self, dev_id: DevId) -> Option<Arc<dyn Device>> {
        self.devices.lock().get(&dev_id).cloned()
    }

    /// Block-device view of `dev_id`, if such a device is registered.
    pub fn get_block(&self, dev_id: DevId) -> Option<Arc<dyn BlockDevice>> {
        self.get(dev_id)?.as_blk()
    }
}

impl Default for DeviceManager {
    fn default() -> Self {
        Self::new()
    }
}
