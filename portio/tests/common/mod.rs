//! In-process stand-ins for the OS pieces `PortIo` talks to.
//!
//! - `FakePlatform`: version id, WOW64 answers, redirection counters, and a
//!   system directory (usually a tempdir).
//! - `FakeScm`: a service control manager with switchable access denial (at
//!   open, lookup, or create) and start failure; a successful start brings
//!   the device up.
//! - `FakeDevices` / `FakeDriver`: the device object, with a simulated port
//!   space, request log, and a page-granular physical memory mapper.
//! - `FakeImages`: driver image lookup with a call counter.
#![allow(dead_code)]

use std::{
    borrow::Cow,
    collections::HashMap,
    io,
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc, Mutex,
    },
};

use portio::{
    comms::{DeviceChannel, DeviceOpener},
    config::DriverConfig,
    deploy::ImageSource,
    direct::PortInstructions,
    platform::{PlatformApi, RedirectionToken, VER_PLATFORM_WIN32_NT, VER_PLATFORM_WIN32_WINDOWS},
    service::{
        ManagerAccess, ManagerHandle, ScmError, ServiceControl, ServiceHandle,
        ServiceRegistration, ServiceRights,
    },
    Bitness, PortIo, PortIoBuilder,
};
use shared::{ioctl::*, wire::PhysicalMemoryRequest};

pub const REDIRECTION_TOKEN: RedirectionToken = RedirectionToken(0x5EED);

/*──────────────────────────── platform ──────────────────────────────────*/

#[derive(Default)]
pub struct FakePlatform {
    pub platform_id: Option<u32>,
    pub wow64: Option<bool>,
    pub system_dir: Option<PathBuf>,
    pub disables: AtomicUsize,
    pub reverts: AtomicUsize,
}

impl FakePlatform {
    pub fn nt() -> Self {
        Self { platform_id: Some(VER_PLATFORM_WIN32_NT), ..Default::default() }
    }

    pub fn legacy() -> Self {
        Self { platform_id: Some(VER_PLATFORM_WIN32_WINDOWS), ..Default::default() }
    }

    pub fn unknown() -> Self {
        Self::default()
    }

    pub fn with_system_dir(mut self, dir: &Path) -> Self {
        self.system_dir = Some(dir.to_path_buf());
        self
    }

    pub fn disables(&self) -> usize {
        self.disables.load(Ordering::SeqCst)
    }

    pub fn reverts(&self) -> usize {
        self.reverts.load(Ordering::SeqCst)
    }
}

impl PlatformApi for FakePlatform {
    fn platform_id(&self) -> Option<u32> {
        self.platform_id
    }

    fn is_wow64_process(&self) -> Option<bool> {
        self.wow64
    }

    fn disable_fs_redirection(&self) -> Option<RedirectionToken> {
        self.disables.fetch_add(1, Ordering::SeqCst);
        Some(REDIRECTION_TOKEN)
    }

    fn revert_fs_redirection(&self, token: RedirectionToken) -> bool {
        self.reverts.fetch_add(1, Ordering::SeqCst);
        token == REDIRECTION_TOKEN
    }

    fn system_directory(&self) -> Option<PathBuf> {
        self.system_dir.clone()
    }
}

/*──────────────────────────── service control ───────────────────────────*/

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScmCall {
    OpenManager(ManagerAccess),
    OpenService(String, ServiceRights),
    Create(ServiceRegistration),
    Start(String),
}

#[derive(Default)]
pub struct ScmState {
    pub deny_full: AtomicBool,
    pub deny_lookup: AtomicBool,
    /// Full access is granted, but creating the service is refused.
    pub deny_create: AtomicBool,
    pub registered: AtomicBool,
    pub start_fails: AtomicBool,
    /// When set, a start only succeeds if this file exists.
    pub start_requires: Mutex<Option<PathBuf>>,
    pub calls: Mutex<Vec<ScmCall>>,
    device_up: Arc<AtomicBool>,
}

/// Cheap to clone; clones share state.
#[derive(Clone, Default)]
pub struct FakeScm {
    pub state: Arc<ScmState>,
}

impl FakeScm {
    fn record(&self, call: ScmCall) {
        self.state.calls.lock().unwrap().push(call);
    }

    pub fn calls(&self) -> Vec<ScmCall> {
        self.state.calls.lock().unwrap().clone()
    }

    pub fn created(&self) -> Vec<ServiceRegistration> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                ScmCall::Create(reg) => Some(reg),
                _ => None,
            })
            .collect()
    }

    pub fn set(&self, flag: &AtomicBool, value: bool) {
        flag.store(value, Ordering::SeqCst);
    }
}

impl ServiceControl for FakeScm {
    fn open_manager(&self, access: ManagerAccess) -> Result<Box<dyn ManagerHandle>, ScmError> {
        self.record(ScmCall::OpenManager(access));
        if access == ManagerAccess::Full && self.state.deny_full.load(Ordering::SeqCst) {
            return Err(ScmError::AccessDenied);
        }
        Ok(Box::new(FakeManager { scm: self.clone() }))
    }
}

struct FakeManager {
    scm: FakeScm,
}

impl ManagerHandle for FakeManager {
    fn open_service(&self, name: &str, rights: ServiceRights) -> Result<Box<dyn ServiceHandle>, ScmError> {
        self.scm.record(ScmCall::OpenService(name.to_owned(), rights));
        let state = &self.scm.state;
        if rights == ServiceRights::ExecuteOnly && state.deny_lookup.load(Ordering::SeqCst) {
            return Err(ScmError::AccessDenied);
        }
        if !state.registered.load(Ordering::SeqCst) {
            return Err(ScmError::NotFound);
        }
        Ok(Box::new(FakeService { scm: self.scm.clone(), name: name.to_owned() }))
    }

    fn create_service(&self, registration: &ServiceRegistration) -> Result<Box<dyn ServiceHandle>, ScmError> {
        self.scm.record(ScmCall::Create(registration.clone()));
        if self.scm.state.deny_create.load(Ordering::SeqCst) {
            return Err(ScmError::AccessDenied);
        }
        if self.scm.state.registered.swap(true, Ordering::SeqCst) {
            return Err(ScmError::AlreadyExists);
        }
        Ok(Box::new(FakeService { scm: self.scm.clone(), name: registration.name.clone() }))
    }
}

struct FakeService {
    scm: FakeScm,
    name: String,
}

impl ServiceHandle for FakeService {
    fn start(&self) -> Result<(), ScmError> {
        self.scm.record(ScmCall::Start(self.name.clone()));
        let state = &self.scm.state;
        if state.start_fails.load(Ordering::SeqCst) {
            return Err(ScmError::Os(io::Error::other("driver entry failed")));
        }
        if let Some(path) = state.start_requires.lock().unwrap().as_ref() {
            if !path.exists() {
                return Err(ScmError::Os(io::Error::from(io::ErrorKind::NotFound)));
            }
        }
        state.device_up.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/*──────────────────────────── device + driver ───────────────────────────*/

const PORT_SPACE: usize = 0x1_0000 + 4;
const PAGE: usize = 0x1000;
pub const RAM_SIZE: usize = 0x1_0000;

struct Mapping {
    physical_base: usize,
    backing: Box<[u32]>,
}

impl Mapping {
    fn len(&self) -> usize {
        self.backing.len() * 4
    }
}

pub struct FakeDriver {
    pub ports: Mutex<Vec<u8>>,
    pub requests: Mutex<Vec<(u32, Vec<u8>)>>,
    pub fail_io: AtomicBool,
    pub ram: Mutex<Vec<u8>>,
    mappings: Mutex<HashMap<usize, Mapping>>,
    next_handle: AtomicUsize,
}

impl Default for FakeDriver {
    fn default() -> Self {
        Self {
            ports: Mutex::new(vec![0; PORT_SPACE]),
            requests: Mutex::default(),
            fail_io: AtomicBool::new(false),
            ram: Mutex::new(vec![0; RAM_SIZE]),
            mappings: Mutex::default(),
            next_handle: AtomicUsize::new(0x100),
        }
    }
}

impl FakeDriver {
    pub fn requests(&self) -> Vec<(u32, Vec<u8>)> {
        self.requests.lock().unwrap().clone()
    }

    pub fn last_request(&self) -> Option<(u32, Vec<u8>)> {
        self.requests.lock().unwrap().last().cloned()
    }

    pub fn live_mappings(&self) -> usize {
        self.mappings.lock().unwrap().len()
    }

    pub fn ram_u32(&self, physical: usize) -> u32 {
        let ram = self.ram.lock().unwrap();
        u32::from_le_bytes(ram[physical..physical + 4].try_into().unwrap())
    }

    pub fn set_ram_u32(&self, physical: usize, value: u32) {
        self.ram.lock().unwrap()[physical..physical + 4].copy_from_slice(&value.to_le_bytes());
    }

    fn port_at(input: &[u8]) -> usize {
        u16::from_le_bytes([input[0], input[1]]) as usize
    }

    fn handle(&self, code: u32, input: &[u8], output: &mut [u8]) -> io::Result<usize> {
        let mut ports = self.ports.lock().unwrap();
        match code {
            IOCTL_READ_PORT_UCHAR => {
                output[0] = ports[Self::port_at(input)];
                Ok(1)
            }
            IOCTL_WRITE_PORT_UCHAR => {
                ports[Self::port_at(input)] = input[2];
                Ok(0)
            }
            IOCTL_READ_PORT_USHORT => {
                let p = Self::port_at(input);
                output[..2].copy_from_slice(&ports[p..p + 2]);
                Ok(2)
            }
            IOCTL_WRITE_PORT_USHORT => {
                let p = Self::port_at(input);
                ports[p..p + 2].copy_from_slice(&input[2..4]);
                Ok(0)
            }
            IOCTL_READ_PORT_ULONG => {
                let p = u32::from_le_bytes(input[..4].try_into().unwrap()) as usize;
                output[..4].copy_from_slice(&ports[p..p + 4]);
                Ok(4)
            }
            IOCTL_WRITE_PORT_ULONG => {
                let p = u32::from_le_bytes(input[..4].try_into().unwrap()) as usize;
                ports[p..p + 4].copy_from_slice(&input[4..8]);
                Ok(0)
            }
            IOCTL_WINIO_MAPPHYSTOLIN => {
                drop(ports);
                let req = PhysicalMemoryRequest::decode(input).map_err(io::Error::other)?;
                let reply = self.map(&req)?;
                let bytes = reply.encode();
                output[..bytes.len()].copy_from_slice(&bytes);
                Ok(bytes.len())
            }
            IOCTL_WINIO_UNMAPPHYSADDR => {
                drop(ports);
                let req = PhysicalMemoryRequest::decode(input).map_err(io::Error::other)?;
                self.unmap(req.handle)?;
                Ok(0)
            }
            _ => Err(io::Error::from(io::ErrorKind::InvalidInput)),
        }
    }

    /// Page-rounded copy of `ram`, written back on unmap.
    fn map(&self, req: &PhysicalMemoryRequest) -> io::Result<PhysicalMemoryRequest> {
        let base = req.physical_address & !(PAGE - 1);
        let end = (req.physical_address + req.size).div_ceil(PAGE) * PAGE;
        if req.size == 0 || end > RAM_SIZE {
            return Err(io::Error::from(io::ErrorKind::InvalidInput));
        }
        let ram = self.ram.lock().unwrap();
        let backing: Box<[u32]> = ram[base..end]
            .chunks_exact(4)
            .map(|c| u32::from_ne_bytes(c.try_into().unwrap()))
            .collect();
        let linear = backing.as_ptr() as usize;
        let handle = self.next_handle.fetch_add(1, Ordering::SeqCst);
        let size = end - base;
        self.mappings
            .lock()
            .unwrap()
            .insert(handle, Mapping { physical_base: base, backing });
        Ok(PhysicalMemoryRequest { handle, size, physical_address: base, linear_address: linear })
    }

    fn unmap(&self, handle: usize) -> io::Result<()> {
        let mapping = self
            .mappings
            .lock()
            .unwrap()
            .remove(&handle)
            .ok_or_else(|| io::Error::from(io::ErrorKind::NotFound))?;
        let mut ram = self.ram.lock().unwrap();
        let len = mapping.len();
        let bytes = mapping.backing.iter().flat_map(|w| w.to_ne_bytes());
        for (dst, src) in ram[mapping.physical_base..mapping.physical_base + len].iter_mut().zip(bytes) {
            *dst = src;
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeDevices {
    pub driver: Arc<FakeDriver>,
    pub available: Arc<AtomicBool>,
    pub opened_paths: Mutex<Vec<String>>,
    pub drops: Arc<AtomicUsize>,
}

impl FakeDevices {
    pub fn opens(&self) -> usize {
        self.opened_paths.lock().unwrap().len()
    }

    pub fn drops(&self) -> usize {
        self.drops.load(Ordering::SeqCst)
    }
}

impl DeviceOpener for FakeDevices {
    fn open(&self, device_path: &str) -> io::Result<Box<dyn DeviceChannel>> {
        self.opened_paths.lock().unwrap().push(device_path.to_owned());
        if !self.available.load(Ordering::SeqCst) {
            return Err(io::Error::from(io::ErrorKind::NotFound));
        }
        Ok(Box::new(FakeChannel { driver: self.driver.clone(), drops: self.drops.clone() }))
    }
}

struct FakeChannel {
    driver: Arc<FakeDriver>,
    drops: Arc<AtomicUsize>,
}

// SAFETY: map replies point into a boxed copy of `ram` owned by the driver's
// mapping table until the handle is unmapped.
unsafe impl DeviceChannel for FakeChannel {
    fn control(&self, code: u32, input: &[u8], output: &mut [u8]) -> io::Result<usize> {
        self.driver.requests.lock().unwrap().push((code, input.to_vec()));
        if self.driver.fail_io.load(Ordering::SeqCst) {
            return Err(io::Error::other("device stopped responding"));
        }
        self.driver.handle(code, input, output)
    }
}

impl Drop for FakeChannel {
    fn drop(&mut self) {
        self.drops.fetch_add(1, Ordering::SeqCst);
    }
}

/*──────────────────────────── images + direct ports ─────────────────────*/

#[derive(Default)]
pub struct FakeImages {
    pub images: HashMap<String, Vec<u8>>,
    pub lookups: AtomicUsize,
}

impl FakeImages {
    pub fn with(mut self, file_name: &str, bytes: &[u8]) -> Self {
        self.images.insert(file_name.to_owned(), bytes.to_vec());
        self
    }

    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

impl ImageSource for FakeImages {
    fn image(&self, file_name: &str) -> Option<Cow<'_, [u8]>> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        self.images.get(file_name).map(|b| Cow::Borrowed(b.as_slice()))
    }
}

#[derive(Default)]
pub struct FakePorts {
    pub space: Mutex<HashMap<u16, u8>>,
}

impl PortInstructions for FakePorts {
    fn read_byte(&self, port: u16) -> u8 {
        self.space.lock().unwrap().get(&port).copied().unwrap_or(0)
    }

    fn write_byte(&self, port: u16, value: u8) {
        self.space.lock().unwrap().insert(port, value);
    }
}

/*──────────────────────────── rig ───────────────────────────────────────*/

pub const IMAGE_BYTES: &[u8] = b"MZ\x90\x00fake inpoutx64 image";

/// Everything wired together for an NT host on x64.
pub struct Rig {
    pub platform: Arc<FakePlatform>,
    pub scm: FakeScm,
    pub devices: Arc<FakeDevices>,
    pub images: Arc<FakeImages>,
    pub config: DriverConfig,
    pub bitness: Bitness,
}

impl Rig {
    pub fn new(platform: FakePlatform, images: FakeImages) -> Self {
        let scm = FakeScm::default();
        let devices = FakeDevices {
            available: scm.state.device_up.clone(),
            ..Default::default()
        };
        Self {
            platform: Arc::new(platform),
            scm,
            devices: Arc::new(devices),
            images: Arc::new(images),
            config: DriverConfig::default(),
            bitness: Bitness::X64,
        }
    }

    pub fn nt() -> Self {
        Self::new(FakePlatform::nt(), FakeImages::default().with("inpoutx64.sys", IMAGE_BYTES))
    }

    /// NT host whose driver is installed and already running.
    pub fn nt_running() -> Self {
        let rig = Self::nt();
        rig.scm.set(&rig.scm.state.registered, true);
        rig.devices.available.store(true, Ordering::SeqCst);
        rig
    }

    pub fn driver(&self) -> &FakeDriver {
        &self.devices.driver
    }

    pub fn builder(&self) -> PortIoBuilder {
        PortIo::builder(self.config.clone())
            .platform(self.platform.clone())
            .services(self.scm.clone())
            .devices(self.devices.clone())
            .images(self.images.clone())
            .direct_ports(None)
            .bitness(self.bitness)
    }

    pub fn attach(&self) -> PortIo {
        self.builder().attach()
    }
}
