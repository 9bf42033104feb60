//! Recording collaborators for host tests

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::convert::Infallible;
use std::net::{Ipv4Addr, SocketAddrV4};
use std::rc::Rc;

use embedded_hal::digital::{ErrorType as PinErrorType, OutputPin, StatefulOutputPin};
use embedded_hal_async::delay::DelayNs;
use embedded_io::{ErrorType, Read, Write};
use hal_abstractions::{
    AnalogFrontEnd, BlockStorage, ChannelGroup, ConsoleConfig, ContentSeeder, DatagramStack,
    LogTaskSpawner, NetError, OpenMode, PriorityControl, RamDiskArena, ServerEntry, ServerHost,
    ServiceError, ServiceLauncher, SpawnError, StorageError, Volume, WallClock,
};

pub struct MockAdc {
    values: Vec<u16>,
    conversions: Cell<u32>,
}

impl MockAdc {
    pub fn new(values: &[u16]) -> Self {
        Self {
            values: values.to_vec(),
            conversions: Cell::new(0),
        }
    }

    pub fn conversions(&self) -> u32 {
        self.conversions.get()
    }
}

impl AnalogFrontEnd for &MockAdc {
    fn full_scale(&self) -> u16 {
        4095
    }

    fn convert(&mut self, _group: ChannelGroup, results: &mut [u16]) -> usize {
        self.conversions.set(self.conversions.get() + 1);
        let n = self.values.len().min(results.len());
        results[..n].copy_from_slice(&self.values[..n]);
        n
    }
}

pub struct MockClock {
    now: Cell<u64>,
}

impl MockClock {
    pub fn new(now: u64) -> Self {
        Self {
            now: Cell::new(now),
        }
    }
}

impl WallClock for MockClock {
    fn now(&self) -> u64 {
        self.now.get()
    }
}

pub struct MockDelay {
    calls: RefCell<Vec<u32>>,
}

impl MockDelay {
    pub fn new() -> Self {
        Self {
            calls: RefCell::new(Vec::new()),
        }
    }

    /// Every `delay_ms` argument, in call order
    pub fn calls(&self) -> Vec<u32> {
        self.calls.borrow().clone()
    }
}

impl DelayNs for &MockDelay {
    async fn delay_ns(&mut self, _ns: u32) {}

    async fn delay_ms(&mut self, ms: u32) {
        self.calls.borrow_mut().push(ms);
    }
}

pub struct MockLed {
    on: Cell<bool>,
    toggles: Cell<u32>,
}

impl MockLed {
    pub fn new() -> Self {
        Self {
            on: Cell::new(false),
            toggles: Cell::new(0),
        }
    }

    pub fn toggles(&self) -> u32 {
        self.toggles.get()
    }

    pub fn is_on(&self) -> bool {
        self.on.get()
    }
}

impl PinErrorType for &MockLed {
    type Error = Infallible;
}

impl OutputPin for &MockLed {
    fn set_low(&mut self) -> Result<(), Infallible> {
        self.on.set(false);
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Infallible> {
        self.on.set(true);
        Ok(())
    }
}

impl StatefulOutputPin for &MockLed {
    fn is_set_high(&mut self) -> Result<bool, Infallible> {
        Ok(self.on.get())
    }

    fn is_set_low(&mut self) -> Result<bool, Infallible> {
        Ok(!self.on.get())
    }

    fn toggle(&mut self) -> Result<(), Infallible> {
        self.toggles.set(self.toggles.get() + 1);
        self.on.set(!self.on.get());
        Ok(())
    }
}

#[derive(Default)]
struct Store {
    files: HashMap<String, Vec<u8>>,
    opens: u32,
    closes: u32,
    writes: u32,
    open_handles: i32,
    fail_open: bool,
    fail_write: bool,
    corrupt_reads: bool,
}

/// Flat in-memory volume; clones share the same files
#[derive(Clone, Default)]
pub struct MockVolume {
    store: Rc<RefCell<Store>>,
}

impl MockVolume {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn content(&self, path: &str) -> Option<Vec<u8>> {
        self.store.borrow().files.get(path).cloned()
    }

    pub fn opens(&self) -> u32 {
        self.store.borrow().opens
    }

    pub fn closes(&self) -> u32 {
        self.store.borrow().closes
    }

    pub fn writes(&self) -> u32 {
        self.store.borrow().writes
    }

    pub fn open_handles(&self) -> i32 {
        self.store.borrow().open_handles
    }

    pub fn fail_open(&self, fail: bool) {
        self.store.borrow_mut().fail_open = fail;
    }

    /// Writes accept zero bytes
    pub fn fail_write(&self, fail: bool) {
        self.store.borrow_mut().fail_write = fail;
    }

    /// Reads flip the first byte of every chunk
    pub fn corrupt_reads(&self, corrupt: bool) {
        self.store.borrow_mut().corrupt_reads = corrupt;
    }
}

pub struct MockFile {
    store: Rc<RefCell<Store>>,
    path: String,
    mode: OpenMode,
    pos: usize,
}

impl ErrorType for MockFile {
    type Error = StorageError;
}

impl Read for MockFile {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, StorageError> {
        if self.mode != OpenMode::Read {
            return Err(StorageError::WrongMode);
        }
        let store = self.store.borrow();
        let data = store.files.get(&self.path).ok_or(StorageError::NotFound)?;
        let n = data.len().saturating_sub(self.pos).min(buf.len());
        buf[..n].copy_from_slice(&data[self.pos..self.pos + n]);
        if n > 0 && store.corrupt_reads {
            buf[0] ^= 0xff;
        }
        self.pos += n;
        Ok(n)
    }
}

impl Write for MockFile {
    fn write(&mut self, buf: &[u8]) -> Result<usize, StorageError> {
        if self.mode == OpenMode::Read {
            return Err(StorageError::WrongMode);
        }
        let mut store = self.store.borrow_mut();
        store.writes += 1;
        if store.fail_write {
            return Ok(0);
        }
        store
            .files
            .entry(self.path.clone())
            .or_default()
            .extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> Result<(), StorageError> {
        Ok(())
    }
}

impl Volume for MockVolume {
    type File = MockFile;

    fn open(&self, path: &str, mode: OpenMode) -> Result<MockFile, StorageError> {
        let mut store = self.store.borrow_mut();
        if store.fail_open {
            return Err(StorageError::Io);
        }
        match mode {
            OpenMode::Read if !store.files.contains_key(path) => {
                return Err(StorageError::NotFound)
            }
            OpenMode::Read => {}
            OpenMode::Append => {
                store.files.entry(path.to_string()).or_default();
            }
            OpenMode::Truncate => {
                store.files.insert(path.to_string(), Vec::new());
            }
        }
        store.opens += 1;
        store.open_handles += 1;
        Ok(MockFile {
            store: Rc::clone(&self.store),
            path: path.to_string(),
            mode,
            pos: 0,
        })
    }

    fn close(&self, file: MockFile) -> Result<(), StorageError> {
        drop(file);
        let mut store = self.store.borrow_mut();
        store.closes += 1;
        store.open_handles -= 1;
        Ok(())
    }
}

pub struct MockBuffer(Vec<u8>);

impl AsMut<[u8]> for MockBuffer {
    fn as_mut(&mut self) -> &mut [u8] {
        &mut self.0
    }
}

pub struct MockStack {
    address: Cell<Option<Ipv4Addr>>,
    fail_socket: Cell<bool>,
    accept: Cell<bool>,
    short_buffers: Cell<bool>,
    free_buffers: Cell<u32>,
    sends: Cell<u32>,
    acquired: Cell<u32>,
    consumed: Cell<u32>,
    released: Cell<u32>,
    last_payload: RefCell<Vec<u8>>,
    last_destination: Cell<Option<SocketAddrV4>>,
    last_buffer_wait: Cell<Option<u32>>,
}

impl MockStack {
    pub fn new() -> Self {
        Self {
            address: Cell::new(None),
            fail_socket: Cell::new(false),
            accept: Cell::new(true),
            short_buffers: Cell::new(false),
            free_buffers: Cell::new(4),
            sends: Cell::new(0),
            acquired: Cell::new(0),
            consumed: Cell::new(0),
            released: Cell::new(0),
            last_payload: RefCell::new(Vec::new()),
            last_destination: Cell::new(None),
            last_buffer_wait: Cell::new(None),
        }
    }

    pub fn assign_address(&self, address: Option<Ipv4Addr>) {
        self.address.set(address);
    }

    pub fn fail_socket(&self, fail: bool) {
        self.fail_socket.set(fail);
    }

    /// Whether sends accept the payload or report zero bytes
    pub fn accept_sends(&self, accept: bool) {
        self.accept.set(accept);
    }

    /// Hand out buffers one byte shorter than requested
    pub fn shorten_buffers(&self, short: bool) {
        self.short_buffers.set(short);
    }

    pub fn set_free_buffers(&self, count: u32) {
        self.free_buffers.set(count);
    }

    pub fn sends(&self) -> u32 {
        self.sends.get()
    }

    pub fn acquired(&self) -> u32 {
        self.acquired.get()
    }

    pub fn consumed(&self) -> u32 {
        self.consumed.get()
    }

    pub fn released(&self) -> u32 {
        self.released.get()
    }

    /// Buffers acquired but neither sent nor released
    pub fn outstanding(&self) -> u32 {
        self.acquired.get() - self.consumed.get() - self.released.get()
    }

    pub fn last_payload(&self) -> Vec<u8> {
        self.last_payload.borrow().clone()
    }

    pub fn last_destination(&self) -> Option<SocketAddrV4> {
        self.last_destination.get()
    }

    pub fn last_buffer_wait(&self) -> Option<u32> {
        self.last_buffer_wait.get()
    }

    fn record(&self, payload: &[u8], dest: SocketAddrV4) {
        self.sends.set(self.sends.get() + 1);
        *self.last_payload.borrow_mut() = payload.to_vec();
        self.last_destination.set(Some(dest));
    }
}

impl DatagramStack for &MockStack {
    type Socket = ();
    type Buffer = MockBuffer;

    fn open_socket(&mut self) -> Result<(), NetError> {
        if self.fail_socket.get() {
            Err(NetError::SocketUnavailable)
        } else {
            Ok(())
        }
    }

    fn assigned_address(&self) -> Option<Ipv4Addr> {
        self.address.get()
    }

    async fn send_copy(&mut self, _socket: &mut (), payload: &[u8], dest: SocketAddrV4) -> usize {
        self.record(payload, dest);
        if self.accept.get() {
            payload.len()
        } else {
            0
        }
    }

    async fn acquire_send_buffer(&mut self, len: usize, max_wait_ms: u32) -> Option<MockBuffer> {
        self.last_buffer_wait.set(Some(max_wait_ms));
        let free = self.free_buffers.get();
        if free == 0 {
            return None;
        }
        self.free_buffers.set(free - 1);
        self.acquired.set(self.acquired.get() + 1);
        let len = if self.short_buffers.get() {
            len.saturating_sub(1)
        } else {
            len
        };
        Some(MockBuffer(vec![0; len]))
    }

    async fn send_handoff(
        &mut self,
        _socket: &mut (),
        buffer: MockBuffer,
        len: usize,
        dest: SocketAddrV4,
    ) -> Result<usize, MockBuffer> {
        self.record(&buffer.0[..len], dest);
        if self.accept.get() {
            self.consumed.set(self.consumed.get() + 1);
            self.free_buffers.set(self.free_buffers.get() + 1);
            Ok(len)
        } else {
            Err(buffer)
        }
    }

    fn release_send_buffer(&mut self, buffer: MockBuffer) {
        drop(buffer);
        self.released.set(self.released.get() + 1);
        self.free_buffers.set(self.free_buffers.get() + 1);
    }
}

pub struct MockLauncher {
    consoles: Vec<ConsoleConfig>,
    server_spawns: u32,
    order: Vec<&'static str>,
    server_error: Option<SpawnError>,
}

impl MockLauncher {
    pub fn new() -> Self {
        Self {
            consoles: Vec::new(),
            server_spawns: 0,
            order: Vec::new(),
            server_error: None,
        }
    }

    pub fn fail_server(&mut self, error: SpawnError) {
        self.server_error = Some(error);
    }

    pub fn consoles(&self) -> Vec<ConsoleConfig> {
        self.consoles.clone()
    }

    pub fn server_spawns(&self) -> u32 {
        self.server_spawns
    }

    pub fn order(&self) -> Vec<&'static str> {
        self.order.clone()
    }
}

impl ServiceLauncher for MockLauncher {
    fn start_console(&mut self, config: &ConsoleConfig) -> Result<(), SpawnError> {
        self.order.push("console");
        self.consoles.push(*config);
        Ok(())
    }

    fn spawn_server_work(&mut self) -> Result<(), SpawnError> {
        self.order.push("server");
        if let Some(e) = self.server_error {
            return Err(e);
        }
        self.server_spawns += 1;
        Ok(())
    }
}

pub struct MockHost {
    created: RefCell<Vec<ServerEntry>>,
    waits: RefCell<Vec<u32>>,
    order: RefCell<Vec<&'static str>>,
    time_sync_error: Cell<Option<ServiceError>>,
    create_error: Cell<Option<ServiceError>>,
}

impl MockHost {
    pub fn new() -> Self {
        Self {
            created: RefCell::new(Vec::new()),
            waits: RefCell::new(Vec::new()),
            order: RefCell::new(Vec::new()),
            time_sync_error: Cell::new(None),
            create_error: Cell::new(None),
        }
    }

    pub fn fail_time_sync(&self, error: ServiceError) {
        self.time_sync_error.set(Some(error));
    }

    pub fn fail_create(&self, error: ServiceError) {
        self.create_error.set(Some(error));
    }

    pub fn created(&self) -> Vec<ServerEntry> {
        self.created.borrow().clone()
    }

    pub fn waits(&self) -> Vec<u32> {
        self.waits.borrow().clone()
    }

    pub fn order(&self) -> Vec<&'static str> {
        self.order.borrow().clone()
    }
}

impl ServerHost for &MockHost {
    type Server = ();

    fn start_time_sync(&mut self) -> Result<(), ServiceError> {
        self.order.borrow_mut().push("time_sync");
        self.time_sync_error.get().map_or(Ok(()), Err)
    }

    fn create_server(&mut self, config: &[ServerEntry]) -> Result<(), ServiceError> {
        self.order.borrow_mut().push("create");
        if let Some(e) = self.create_error.get() {
            return Err(e);
        }
        self.created.borrow_mut().extend_from_slice(config);
        Ok(())
    }

    async fn do_server_work(&mut self, _server: &mut (), max_wait_ms: u32) {
        self.waits.borrow_mut().push(max_wait_ms);
    }
}

/// Storage, seeder, task spawner and priority control in one, journaling
/// every call
pub struct MockBoard {
    journal: RefCell<Vec<String>>,
    volume_error: Cell<Option<StorageError>>,
    seed_error: Cell<Option<StorageError>>,
    spawn_error: Cell<Option<SpawnError>>,
    spawned: RefCell<Option<MockVolume>>,
}

impl MockBoard {
    pub fn new() -> Self {
        Self {
            journal: RefCell::new(Vec::new()),
            volume_error: Cell::new(None),
            seed_error: Cell::new(None),
            spawn_error: Cell::new(None),
            spawned: RefCell::new(None),
        }
    }

    pub fn fail_volume(&self, error: StorageError) {
        self.volume_error.set(Some(error));
    }

    pub fn fail_seed(&self, error: StorageError) {
        self.seed_error.set(Some(error));
    }

    pub fn fail_spawn(&self, error: SpawnError) {
        self.spawn_error.set(Some(error));
    }

    pub fn journal(&self) -> Vec<String> {
        self.journal.borrow().clone()
    }

    /// Volume handed to the logger task
    pub fn spawned_volume(&self) -> Option<MockVolume> {
        self.spawned.borrow().clone()
    }

    fn note(&self, step: String) {
        self.journal.borrow_mut().push(step);
    }
}

impl BlockStorage for &MockBoard {
    type Volume = MockVolume;

    fn init_volume(
        &mut self,
        name: &'static str,
        arena: RamDiskArena,
    ) -> Result<MockVolume, StorageError> {
        self.note(format!("init_volume {}", name));
        drop(arena);
        match self.volume_error.get() {
            Some(e) => Err(e),
            None => Ok(MockVolume::new()),
        }
    }
}

impl ContentSeeder for &MockBoard {
    fn seed<V: Volume>(&mut self, _volume: &V, mount: &str) -> Result<(), StorageError> {
        self.note(format!("seed {}", mount));
        self.seed_error.get().map_or(Ok(()), Err)
    }
}

impl LogTaskSpawner<MockVolume> for &MockBoard {
    fn spawn_logger(&mut self, volume: MockVolume) -> Result<(), SpawnError> {
        self.note("spawn_logger".to_string());
        if let Some(e) = self.spawn_error.get() {
            return Err(e);
        }
        *self.spawned.borrow_mut() = Some(volume);
        Ok(())
    }
}

impl PriorityControl for &MockBoard {
    fn lower_to_idle(&mut self) {
        self.note("lower_to_idle".to_string());
    }
}
