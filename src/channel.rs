//! Channel registry for the sensor characteristics exposed by the peripheral.
//!
//! Each channel maps a GATT characteristic UUID to a human-readable name, the
//! binary layout of its value and the scale factor that turns the raw value
//! into a physical unit. The registry keeps channels in declaration order,
//! which is also the column order of every emitted record.

use std::collections::HashSet;
use thiserror::Error;
use uuid::Uuid;

/// GATT service on the EP Agora board that carries the BME680 channels.
pub const AGORA_SERVICE_UUID: Uuid = Uuid::from_u128(0x00000001_8dd4_4087_a16a_04a7c8e01734);

/// Standard Bluetooth SIG temperature characteristic (0x2A6E).
pub const TEMPERATURE_UUID: Uuid = Uuid::from_u128(0x00002a6e_0000_1000_8000_00805f9b34fb);
/// Standard Bluetooth SIG humidity characteristic (0x2A6F).
pub const HUMIDITY_UUID: Uuid = Uuid::from_u128(0x00002a6f_0000_1000_8000_00805f9b34fb);
/// Standard Bluetooth SIG pressure characteristic (0x2A6D).
pub const PRESSURE_UUID: Uuid = Uuid::from_u128(0x00002a6d_0000_1000_8000_00805f9b34fb);
/// Estimated CO2 concentration in ppm.
pub const CO2_UUID: Uuid = Uuid::from_u128(0x00001001_8dd4_4087_a16a_04a7c8e01734);
/// Estimated breath-VOC concentration in ppm.
pub const BVOC_UUID: Uuid = Uuid::from_u128(0x00002001_8dd4_4087_a16a_04a7c8e01734);
/// Gas sensor resistance in ohms.
pub const GAS_RESISTANCE_UUID: Uuid = Uuid::from_u128(0x00005001_8dd4_4087_a16a_04a7c8e01734);

/// Byte order of a characteristic value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ByteOrder {
    #[default]
    Little,
    Big,
}

/// Primitive type stored in a characteristic value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleKind {
    I8,
    U8,
    I16,
    U16,
    I32,
    U32,
    I64,
    U64,
    F32,
    F64,
}

impl SampleKind {
    /// Width of the encoded value in bytes.
    pub const fn width(self) -> usize {
        match self {
            SampleKind::I8 | SampleKind::U8 => 1,
            SampleKind::I16 | SampleKind::U16 => 2,
            SampleKind::I32 | SampleKind::U32 | SampleKind::F32 => 4,
            SampleKind::I64 | SampleKind::U64 | SampleKind::F64 => 8,
        }
    }

    pub const fn is_signed(self) -> bool {
        matches!(
            self,
            SampleKind::I8 | SampleKind::I16 | SampleKind::I32 | SampleKind::I64
        )
    }

    pub const fn is_float(self) -> bool {
        matches!(self, SampleKind::F32 | SampleKind::F64)
    }
}

/// Binary layout of a characteristic value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Layout {
    pub order: ByteOrder,
    pub kind: SampleKind,
}

impl Layout {
    /// Little-endian layout of the given kind.
    pub const fn le(kind: SampleKind) -> Self {
        Self {
            order: ByteOrder::Little,
            kind,
        }
    }

    /// Big-endian layout of the given kind.
    pub const fn be(kind: SampleKind) -> Self {
        Self {
            order: ByteOrder::Big,
            kind,
        }
    }

    pub const fn width(&self) -> usize {
        self.kind.width()
    }
}

/// One monitored physical quantity.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelDescriptor {
    /// GATT characteristic UUID
    pub id: Uuid,
    /// Column name used in records and logs
    pub name: String,
    /// Encoding of the characteristic value
    pub layout: Layout,
    /// Multiplier applied after decoding the raw value
    pub scale: f64,
}

impl ChannelDescriptor {
    pub fn new(id: Uuid, name: impl Into<String>, layout: Layout, scale: f64) -> Self {
        Self {
            id,
            name: name.into(),
            layout,
            scale,
        }
    }
}

/// Errors returned by registry construction and lookup.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RegistryError {
    /// No channel is registered for the characteristic
    #[error("no channel registered for characteristic {0}")]
    NotFound(Uuid),
    /// Two descriptors share an identifier or a name
    #[error("duplicate channel: {0}")]
    Duplicate(String),
}

/// Ordered, immutable set of channel descriptors.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelRegistry {
    service: Option<Uuid>,
    channels: Vec<ChannelDescriptor>,
}

impl ChannelRegistry {
    /// Build a registry from descriptors in declaration order.
    ///
    /// # Errors
    /// Returns [`RegistryError::Duplicate`] if two descriptors share a UUID or a name.
    pub fn new(
        service: Option<Uuid>,
        channels: Vec<ChannelDescriptor>,
    ) -> Result<Self, RegistryError> {
        let mut ids = HashSet::new();
        let mut names = HashSet::new();
        for channel in &channels {
            if !ids.insert(channel.id) {
                return Err(RegistryError::Duplicate(channel.id.to_string()));
            }
            if !names.insert(channel.name.as_str()) {
                return Err(RegistryError::Duplicate(channel.name.clone()));
            }
        }

        Ok(Self { service, channels })
    }

    /// The BME680 channel table served by the EP Agora firmware.
    pub fn agora() -> Self {
        Self {
            service: Some(AGORA_SERVICE_UUID),
            channels: vec![
                ChannelDescriptor::new(
                    TEMPERATURE_UUID,
                    "Temperature",
                    Layout::le(SampleKind::I16),
                    0.01,
                ),
                ChannelDescriptor::new(
                    HUMIDITY_UUID,
                    "Humidity",
                    Layout::le(SampleKind::U16),
                    0.01,
                ),
                ChannelDescriptor::new(
                    PRESSURE_UUID,
                    "Pressure",
                    Layout::le(SampleKind::U32),
                    0.1,
                ),
                ChannelDescriptor::new(CO2_UUID, "CO2", Layout::le(SampleKind::F32), 1.0),
                ChannelDescriptor::new(BVOC_UUID, "bVOC", Layout::le(SampleKind::F32), 1.0),
                ChannelDescriptor::new(
                    GAS_RESISTANCE_UUID,
                    "Gas Resistance",
                    Layout::le(SampleKind::U32),
                    1.0,
                ),
            ],
        }
    }

    /// Look up the descriptor for a characteristic.
    ///
    /// # Errors
    /// Returns [`RegistryError::NotFound`] for unregistered characteristics.
    pub fn lookup(&self, id: &Uuid) -> Result<&ChannelDescriptor, RegistryError> {
        self.channels
            .iter()
            .find(|c| c.id == *id)
            .ok_or(RegistryError::NotFound(*id))
    }

    pub fn contains(&self, id: &Uuid) -> bool {
        self.channels.iter().any(|c| c.id == *id)
    }

    /// GATT service that owns the channels, if restricted to one.
    pub fn service(&self) -> Option<Uuid> {
        self.service
    }

    pub fn iter(&self) -> impl Iterator<Item = &ChannelDescriptor> {
        self.channels.iter()
    }

    /// Channel names in declaration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.channels.iter().map(|c| c.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }
}

impl<'a> IntoIterator for &'a ChannelRegistry {
    type Item = &'a ChannelDescriptor;
    type IntoIter = std::slice::Iter<'a, ChannelDescriptor>;

    fn into_iter(self) -> Self::IntoIter {
        self.channels.iter()
    }
}
