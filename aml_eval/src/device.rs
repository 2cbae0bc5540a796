use crate::{
    method::Executor,
    namespace::{AmlHandle, AmlName, NameSeg},
    object::{Object, ObjectType},
    resource::{self, Resource},
    AmlError,
};
use alloc::{string::String, vec::Vec};
use bit_field::BitField;
use core::cmp::Ordering;
use log::{info, warn};

/// Representation of the return value of a `_STA` method, which represents the status of an object. It must be
/// evaluated, if present, before evaluating the `_INI` method for an device.
///
/// The `Default` implementation of this type is the correct value to use if a device doesn't have a `_STA` object
/// to evaluate.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct StatusObject {
    /// Whether the device is physically present. If this is `false`, `enabled` should also be `false` (i.e. a
    /// device that is not present can't be enabled). However, this is not enforced here if the firmware is doing
    /// something wrong.
    pub present: bool,
    /// Whether the device is enabled. Both `present` and `enabled` must be `true` for the device to decode its
    /// hardware resources.
    pub enabled: bool,
    pub show_in_ui: bool,
    pub functional: bool,
    /// Only applicable for Control Method Battery Devices (`PNP0C0A`). For all other devices, ignore this value.
    pub battery_present: bool,
}

impl Default for StatusObject {
    fn default() -> Self {
        StatusObject { present: true, enabled: true, show_in_ui: true, functional: true, battery_present: true }
    }
}

impl StatusObject {
    pub fn from_integer(value: u64) -> Result<StatusObject, AmlError> {
        /*
         * Bits 5+ are reserved and are expected to be cleared.
         */
        if value.get_bits(5..64) != 0 {
            return Err(AmlError::InvalidStatusObject);
        }

        Ok(StatusObject {
            present: value.get_bit(0),
            enabled: value.get_bit(1),
            show_in_ui: value.get_bit(2),
            functional: value.get_bit(3),
            battery_present: value.get_bit(4),
        })
    }
}

/// A device found by [`crate::Interpreter::enumerate_devices`].
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct DeviceInfo {
    pub path: AmlName,
    pub hid: Option<String>,
    pub cids: Vec<String>,
}

impl DeviceInfo {
    /// The id the device is sorted and matched by: its hardware id, or failing that its first compatible id.
    pub fn primary_id(&self) -> Option<&str> {
        self.hid.as_deref().or_else(|| self.cids.first().map(String::as_str))
    }
}

/// The id of the processor container device, which describes no hardware of its own.
const PROCESSOR_CONTAINER_ID: &str = "ACPI0010";

/// Decode a compressed EISA id, as returned by `_HID` or `_CID` methods that return an integer, into its string
/// form (e.g. `PNP0A03`).
pub fn eisa_id_to_string(value: u32) -> String {
    /*
     * The id is stored big-endian: three 5-bit characters, offset from `@`, followed by a 16-bit product number
     * that is written out in hex.
     */
    let id = value.swap_bytes();
    let char_at = |shift: usize| (b'@' + id.get_bits(shift..(shift + 5)) as u8) as char;

    let mut string = String::with_capacity(7);
    string.push(char_at(26));
    string.push(char_at(21));
    string.push(char_at(16));
    for shift in [12, 8, 4, 0] {
        let digit = id.get_bits(shift..(shift + 4)) as u8;
        string.push(char::from_digit(digit as u32, 16).unwrap_or('0').to_ascii_uppercase());
    }
    string
}

/// Order device ids by their alphabetic vendor prefix, and then by the hex value of the rest. This puts `PNP0A03`
/// before `PNP0C0F` and groups ids from the same vendor together.
pub fn compare_ids(a: &str, b: &str) -> Ordering {
    let (mut a_rest, mut b_rest) = (a.as_bytes(), b.as_bytes());
    while let (Some(x), Some(y)) = (a_rest.first(), b_rest.first()) {
        if x.is_ascii_digit() || y.is_ascii_digit() {
            break;
        }
        if x != y {
            return x.cmp(y);
        }
        a_rest = &a_rest[1..];
        b_rest = &b_rest[1..];
    }

    let hex_value = |bytes: &[u8]| {
        bytes.iter().take_while(|byte| byte.is_ascii_hexdigit()).fold(0u64, |value, byte| {
            let digit = (*byte as char).to_digit(16).unwrap_or(0) as u64;
            value.saturating_mul(16).saturating_add(digit)
        })
    };
    hex_value(a_rest).cmp(&hex_value(b_rest)).then_with(|| a.cmp(b))
}

impl Executor<'_> {
    /// Evaluate a device's `_STA`. Devices without one are assumed to be present and working.
    pub fn device_status(&mut self, device: &AmlName) -> Result<StatusObject, AmlError> {
        match self.evaluate_child_integer(device, NameSeg(*b"_STA"))? {
            Some(value) => StatusObject::from_integer(value),
            None => Ok(StatusObject::default()),
        }
    }

    /// Evaluate a device's `_HID`, if it has one.
    pub fn hardware_id(&mut self, device: &AmlName) -> Result<Option<String>, AmlError> {
        let Some(handle) = self.child_handle(device, NameSeg(*b"_HID"))? else { return Ok(None) };
        let id = self.evaluate_handle(handle, Vec::new())?;
        let id = id_to_string(&id.lock())?;
        Ok(Some(id))
    }

    /// Evaluate a device's `_CID`, which may be a single id or a package of them.
    pub fn compatible_ids(&mut self, device: &AmlName) -> Result<Vec<String>, AmlError> {
        let Some(handle) = self.child_handle(device, NameSeg(*b"_CID"))? else { return Ok(Vec::new()) };
        let ids = self.evaluate_handle(handle, Vec::new())?;

        let elements = match &*ids.lock() {
            Object::Package(elements) => elements.clone(),
            single => return Ok(alloc::vec![id_to_string(single)?]),
        };
        elements
            .into_iter()
            .map(|element| {
                let element = self.follow_reference(element)?;
                let id = id_to_string(&element.lock());
                id
            })
            .collect()
    }

    /// Evaluate a device's `_CRS` and parse the resource template it returns.
    pub fn current_resources(&mut self, device: &AmlName) -> Result<Vec<Resource>, AmlError> {
        let handle = match self.child_handle(device, NameSeg(*b"_CRS")) {
            Ok(Some(handle)) => handle,
            Ok(None) | Err(AmlError::ObjectDoesNotExist(_)) => return Err(AmlError::NoSuchDevice),
            Err(err) => return Err(err),
        };
        let template = self.evaluate_handle(handle, Vec::new())?;
        let template = template.lock();
        match &*template {
            Object::Buffer(bytes) | Object::RawDataBuffer(bytes) => resource::resource_descriptor_list(bytes),
            other => Err(AmlError::InvalidReturnType { expected: ObjectType::Buffer, got: other.typ() }),
        }
    }

    /// Run `\_SB._INI`, and then `_INI` on every device that is present, in definition order. Devices that are
    /// neither present nor functional are not descended into. A device that fails to initialize is logged and
    /// skipped.
    pub fn initialize_devices(&mut self) -> Result<(), AmlError> {
        let sb = AmlName::from_str("\\_SB")?;
        match self.device_status(&sb) {
            Ok(status) if !status.present => {
                info!("\\_SB is not present, skipping device initialization");
                return Ok(());
            }
            Ok(_) => (),
            Err(err) => warn!("Failed to evaluate \\_SB._STA: {:?}", err),
        }
        if let Some(ini) = self.child_handle(&sb, NameSeg(*b"_INI"))? {
            self.evaluate_handle(ini, Vec::new())?;
        }

        let root = self.namespace.root();
        self.walk_devices(root, &mut |executor, path, status| {
            if !status.present {
                return Ok(());
            }
            if let Some(ini) = executor.child_handle(path, NameSeg(*b"_INI"))? {
                executor.evaluate_handle(ini, Vec::new())?;
            }
            Ok(())
        })
    }

    /// Find every device that is present and has an id, sorted by id. Devices with a hardware id come before those
    /// only identified by compatible ids.
    pub fn enumerate_devices(&mut self) -> Result<Vec<DeviceInfo>, AmlError> {
        let mut devices = Vec::new();
        let root = self.namespace.root();

        self.walk_devices(root, &mut |executor, path, status| {
            if !status.present {
                return Ok(());
            }
            let hid = executor.hardware_id(path)?;
            let cids = executor.compatible_ids(path)?;

            let is_container = |id: &str| id == PROCESSOR_CONTAINER_ID;
            if hid.as_deref().is_some_and(is_container) {
                return Ok(());
            }
            let cids: Vec<String> = cids.into_iter().filter(|id| !is_container(id)).collect();
            if hid.is_none() && cids.is_empty() {
                return Ok(());
            }

            devices.push(DeviceInfo { path: path.clone(), hid, cids });
            Ok(())
        })?;

        devices.sort_by(|a, b| {
            b.hid
                .is_some()
                .cmp(&a.hid.is_some())
                .then_with(|| compare_ids(a.primary_id().unwrap_or(""), b.primary_id().unwrap_or("")))
                .then_with(|| a.path.cmp(&b.path))
        });
        Ok(devices)
    }

    /// Visit the devices below `parent` depth-first, in definition order. `f` is only called for devices whose
    /// `_STA` can be evaluated, and errors from it are logged rather than propagated.
    fn walk_devices(
        &mut self,
        parent: AmlHandle,
        f: &mut dyn FnMut(&mut Self, &AmlName, StatusObject) -> Result<(), AmlError>,
    ) -> Result<(), AmlError> {
        let children = self.namespace.node(parent)?.children.clone();

        for child in children {
            // Nodes can be removed by the methods we run, so check each one is still there
            let Ok(object) = self.namespace.get(child) else { continue };
            let path = self.namespace.path_of(child)?;

            match object.typ() {
                ObjectType::Device => {
                    let status = match self.device_status(&path) {
                        Ok(status) => status,
                        Err(err) => {
                            warn!("Failed to evaluate {}._STA: {:?}", path, err);
                            continue;
                        }
                    };

                    if let Err(err) = f(self, &path, status) {
                        warn!("Failed to query device {}: {:?}", path, err);
                    }
                    if status.present || status.functional {
                        self.walk_devices(child, f)?;
                    }
                }
                ObjectType::PredefinedScope | ObjectType::Processor | ObjectType::ThermalZone => {
                    self.walk_devices(child, f)?
                }
                _ => (),
            }
        }
        Ok(())
    }
}

fn id_to_string(id: &Object) -> Result<String, AmlError> {
    match id {
        Object::String(string) => Ok(string.clone()),
        Object::Integer(value) => Ok(eisa_id_to_string(*value as u32)),
        other => Err(AmlError::InvalidReturnType { expected: ObjectType::String, got: other.typ() }),
    }
}
