//! In-memory transport and sink used by unit tests.

use crate::mac_address::{DeviceTarget, MacAddress};
use crate::sink::RecordSink;
use crate::transport::{
    BoxFuture, Connection, PeripheralInfo, ReadError, Transport, TransportError,
};
use std::collections::{HashMap, VecDeque};
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};
use uuid::Uuid;

/// A stable MAC address for unit tests.
pub const TEST_MAC: MacAddress = MacAddress([0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF]);

/// Scripted outcome of one characteristic read.
#[derive(Debug, Clone)]
pub enum Reply {
    Value(Vec<u8>),
    Fail(ReadError),
    /// Never completes
    Hang,
}

#[derive(Debug, Default)]
struct Script {
    once: VecDeque<Reply>,
    repeat: Option<Reply>,
}

/// Connection answering reads from per-characteristic scripts.
///
/// One-shot replies are consumed first, then the repeating reply is used.
/// Characteristics without a script fail with a transient error.
#[derive(Debug, Clone, Default)]
pub struct FakeConnection {
    characteristics: Vec<Uuid>,
    scripts: Arc<Mutex<HashMap<Uuid, Script>>>,
    reads: Arc<Mutex<Vec<Uuid>>>,
    disconnects: Arc<AtomicUsize>,
    disconnect_hangs: bool,
}

impl FakeConnection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Characteristics reported by [`Connection::characteristics`].
    pub fn with_characteristics(mut self, ids: impl IntoIterator<Item = Uuid>) -> Self {
        self.characteristics = ids.into_iter().collect();
        self
    }

    /// Answer every read of `id` with `reply`.
    pub fn reply(self, id: Uuid, reply: Reply) -> Self {
        self.scripts.lock().unwrap().entry(id).or_default().repeat = Some(reply);
        self
    }

    /// Answer the next unanswered read of `id` with `reply`.
    pub fn reply_once(self, id: Uuid, reply: Reply) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .entry(id)
            .or_default()
            .once
            .push_back(reply);
        self
    }

    /// Make [`Connection::disconnect`] never complete.
    pub fn with_hanging_disconnect(mut self) -> Self {
        self.disconnect_hangs = true;
        self
    }

    /// Characteristics read so far, in order.
    pub fn reads(&self) -> Vec<Uuid> {
        self.reads.lock().unwrap().clone()
    }

    pub fn disconnects(&self) -> usize {
        self.disconnects.load(Ordering::SeqCst)
    }

    fn next_reply(&self, id: Uuid) -> Reply {
        self.reads.lock().unwrap().push(id);
        let mut scripts = self.scripts.lock().unwrap();
        match scripts.get_mut(&id) {
            Some(script) => script
                .once
                .pop_front()
                .or_else(|| script.repeat.clone())
                .unwrap_or_else(|| Reply::Fail(ReadError::Transient("no reply".into()))),
            None => Reply::Fail(ReadError::Transient(format!("unscripted read of {id}"))),
        }
    }
}

impl Connection for FakeConnection {
    fn characteristics(&self) -> BoxFuture<'_, Result<Vec<Uuid>, TransportError>> {
        let ids = self.characteristics.clone();
        Box::pin(async move { Ok(ids) })
    }

    fn read(&self, id: Uuid) -> BoxFuture<'_, Result<Vec<u8>, ReadError>> {
        let reply = self.next_reply(id);
        Box::pin(async move {
            match reply {
                Reply::Value(bytes) => Ok(bytes),
                Reply::Fail(err) => Err(err),
                Reply::Hang => std::future::pending().await,
            }
        })
    }

    fn disconnect(&self) -> BoxFuture<'_, Result<(), TransportError>> {
        self.disconnects.fetch_add(1, Ordering::SeqCst);
        let hangs = self.disconnect_hangs;
        Box::pin(async move {
            if hangs {
                std::future::pending::<()>().await;
            }
            Ok(())
        })
    }
}

/// Transport that "finds" a fixed set of peripherals and hands out clones of
/// one [`FakeConnection`].
#[derive(Debug, Clone)]
pub struct FakeTransport {
    pub peripherals: Vec<PeripheralInfo>,
    pub connection: FakeConnection,
    /// Simulated scan duration
    pub scan_time: Duration,
    /// Simulated link setup duration
    pub connect_time: Duration,
    pub fail_connect: bool,
}

impl FakeTransport {
    pub fn new(connection: FakeConnection) -> Self {
        Self {
            peripherals: vec![PeripheralInfo {
                address: TEST_MAC,
                name: Some("EP Agora".to_string()),
            }],
            connection,
            scan_time: Duration::ZERO,
            connect_time: Duration::ZERO,
            fail_connect: false,
        }
    }
}

impl Transport for FakeTransport {
    fn discover<'a>(
        &'a self,
        target: &'a DeviceTarget,
        window: Duration,
    ) -> BoxFuture<'a, Result<Vec<PeripheralInfo>, TransportError>> {
        Box::pin(async move {
            tokio::time::sleep(self.scan_time.min(window)).await;
            Ok(self
                .peripherals
                .iter()
                .filter(|p| match target {
                    DeviceTarget::Address(address) => p.address == *address,
                    DeviceTarget::Name(name) => p.name.as_deref() == Some(name.as_str()),
                })
                .cloned()
                .collect())
        })
    }

    fn connect<'a>(
        &'a self,
        _peripheral: &'a PeripheralInfo,
    ) -> BoxFuture<'a, Result<Box<dyn Connection>, TransportError>> {
        Box::pin(async move {
            tokio::time::sleep(self.connect_time).await;
            if self.fail_connect {
                return Err(TransportError::Bluetooth("connection refused".into()));
            }
            Ok(Box::new(self.connection.clone()) as Box<dyn Connection>)
        })
    }
}

/// Sink collecting emitted records in memory.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    lines: Arc<Mutex<Vec<(SystemTime, String)>>>,
}

impl MemorySink {
    pub fn records(&self) -> Vec<String> {
        self.lines
            .lock()
            .unwrap()
            .iter()
            .map(|(_, record)| record.clone())
            .collect()
    }
}

impl RecordSink for MemorySink {
    fn emit(&mut self, at: SystemTime, record: &str) -> io::Result<()> {
        self.lines.lock().unwrap().push((at, record.to_string()));
        Ok(())
    }
}
