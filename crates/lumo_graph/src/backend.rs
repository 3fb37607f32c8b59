// SPDX-License-Identifier: MIT OR Apache-2.0
//! GPU backend boundary.
//!
//! The graph core never talks to a graphics API directly. Nodes allocate and
//! release device resources through the [`Backend`] trait and receive an
//! opaque [`CommandHandle`] to record work into. [`HeadlessBackend`] is an
//! allocation-tracking implementation used by the headless driver and tests.

use indexmap::IndexMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt;

/// Opaque identifier of a device resource (texture, buffer, acceleration structure)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceId(pub u64);

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "res{}", self.0)
    }
}

/// Two-dimensional size of a sized resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Extent {
    /// Width in texels
    pub width: u32,
    /// Height in texels
    pub height: u32,
}

impl Extent {
    /// Unsized extent
    pub const ZERO: Extent = Extent::new(0, 0);

    /// Create a new extent
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Whether either dimension is zero
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Number of texels covered
    pub fn area(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }
}

impl fmt::Display for Extent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Texel format of a texture allocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum TextureFormat {
    /// 8-bit RGBA
    #[default]
    Rgba8,
    /// 16-bit float RGBA
    Rgba16Float,
    /// 32-bit float RGBA
    Rgba32Float,
    /// 32-bit depth
    Depth32,
}

impl TextureFormat {
    /// Size of one texel in bytes
    pub fn bytes_per_texel(&self) -> u64 {
        match self {
            Self::Rgba8 | Self::Depth32 => 4,
            Self::Rgba16Float => 8,
            Self::Rgba32Float => 16,
        }
    }
}

/// Description of a texture to allocate
#[derive(Debug, Clone, PartialEq)]
pub struct TextureDesc {
    /// Debug label
    pub label: String,
    /// Size of one face
    pub size: Extent,
    /// Texel format
    pub format: TextureFormat,
    /// Whether the texture is a six-faced cube
    pub cube: bool,
}

impl TextureDesc {
    /// Bytes the allocation occupies
    pub fn byte_size(&self) -> u64 {
        let faces = if self.cube { 6 } else { 1 };
        self.size.area() * self.format.bytes_per_texel() * faces
    }
}

/// Description of a buffer to allocate
#[derive(Debug, Clone, PartialEq)]
pub struct BufferDesc {
    /// Debug label
    pub label: String,
    /// Size in bytes
    pub size: u64,
}

/// Backend allocation errors
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    /// Zero-sized allocations are rejected
    #[error("Cannot allocate zero-sized resource: {0}")]
    ZeroSized(String),

    /// Device memory budget exhausted
    #[error("Out of device memory allocating {label} ({bytes} bytes)")]
    OutOfMemory {
        /// Label of the failed allocation
        label: String,
        /// Requested size
        bytes: u64,
    },

    /// Backend-specific failure
    #[error("{0}")]
    Custom(String),
}

/// Device resource allocator shared by every node through the context
pub trait Backend: Send + Sync {
    /// Human-readable backend name
    fn name(&self) -> &str;

    /// Allocate a texture
    fn create_texture(&self, desc: &TextureDesc) -> Result<ResourceId, BackendError>;

    /// Allocate a buffer
    fn create_buffer(&self, desc: &BufferDesc) -> Result<ResourceId, BackendError>;

    /// Release a resource. Unknown ids are ignored.
    fn release(&self, id: ResourceId);
}

/// A live allocation tracked by [`HeadlessBackend`]
#[derive(Debug, Clone, PartialEq)]
pub struct Allocation {
    /// Debug label
    pub label: String,
    /// Size in bytes
    pub bytes: u64,
}

#[derive(Debug, Default)]
struct HeadlessState {
    next_id: u64,
    live: IndexMap<ResourceId, Allocation>,
    created: u64,
    released: u64,
}

/// Backend that allocates nothing on a device but tracks every allocation
#[derive(Debug, Default)]
pub struct HeadlessBackend {
    state: Mutex<HeadlessState>,
    budget: Option<u64>,
}

impl HeadlessBackend {
    /// Create a backend with unlimited memory
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a backend that fails allocations beyond `bytes` of live memory
    pub fn with_budget(bytes: u64) -> Self {
        Self {
            state: Mutex::new(HeadlessState::default()),
            budget: Some(bytes),
        }
    }

    /// Number of live allocations
    pub fn live_count(&self) -> usize {
        self.state.lock().live.len()
    }

    /// Total bytes of live allocations
    pub fn live_bytes(&self) -> u64 {
        self.state.lock().live.values().map(|a| a.bytes).sum()
    }

    /// Number of allocations ever made
    pub fn created_count(&self) -> u64 {
        self.state.lock().created
    }

    /// Number of releases of live allocations
    pub fn released_count(&self) -> u64 {
        self.state.lock().released
    }

    /// Whether a resource is still allocated
    pub fn is_live(&self, id: ResourceId) -> bool {
        self.state.lock().live.contains_key(&id)
    }

    /// Look up a live allocation
    pub fn allocation(&self, id: ResourceId) -> Option<Allocation> {
        self.state.lock().live.get(&id).cloned()
    }

    fn allocate(&self, label: &str, bytes: u64) -> Result<ResourceId, BackendError> {
        if bytes == 0 {
            return Err(BackendError::ZeroSized(label.to_string()));
        }

        let mut state = self.state.lock();
        if let Some(budget) = self.budget {
            let used: u64 = state.live.values().map(|a| a.bytes).sum();
            if used + bytes > budget {
                return Err(BackendError::OutOfMemory {
                    label: label.to_string(),
                    bytes,
                });
            }
        }

        state.next_id += 1;
        state.created += 1;
        let id = ResourceId(state.next_id);
        state.live.insert(
            id,
            Allocation {
                label: label.to_string(),
                bytes,
            },
        );
        Ok(id)
    }
}

impl Backend for HeadlessBackend {
    fn name(&self) -> &str {
        "headless"
    }

    fn create_texture(&self, desc: &TextureDesc) -> Result<ResourceId, BackendError> {
        self.allocate(&desc.label, desc.byte_size())
    }

    fn create_buffer(&self, desc: &BufferDesc) -> Result<ResourceId, BackendError> {
        self.allocate(&desc.label, desc.size)
    }

    fn release(&self, id: ResourceId) {
        let mut state = self.state.lock();
        if state.live.shift_remove(&id).is_some() {
            state.released += 1;
        }
    }
}

/// Opaque command-recording handle forwarded to nodes during execution.
///
/// The core never looks inside; backend-aware nodes downcast it to the
/// recorder type their backend provides.
pub struct CommandHandle<'a> {
    inner: Option<&'a mut (dyn Any + 'static)>,
}

impl<'a> CommandHandle<'a> {
    /// Wrap a backend command recorder
    pub fn new(recorder: &'a mut (dyn Any + 'static)) -> Self {
        Self {
            inner: Some(recorder),
        }
    }

    /// A handle with no recorder behind it
    pub fn detached() -> Self {
        Self { inner: None }
    }

    /// Whether a recorder is attached
    pub fn is_attached(&self) -> bool {
        self.inner.is_some()
    }

    /// Access the recorder as its concrete type
    pub fn downcast_mut<T: Any>(&mut self) -> Option<&mut T> {
        self.inner.as_deref_mut()?.downcast_mut::<T>()
    }
}

impl fmt::Debug for CommandHandle<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandHandle")
            .field("attached", &self.is_attached())
            .finish()
    }
}

/// Command recorder of the headless backend: a list of labelled commands
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HeadlessCommands {
    commands: Vec<String>,
}

impl HeadlessCommands {
    /// Create an empty recorder
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a command
    pub fn record(&mut self, command: impl Into<String>) {
        self.commands.push(command.into());
    }

    /// Recorded commands in submission order
    pub fn commands(&self) -> &[String] {
        &self.commands
    }

    /// Take all recorded commands, leaving the recorder empty
    pub fn drain(&mut self) -> Vec<String> {
        std::mem::take(&mut self.commands)
    }

    /// Number of recorded commands
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    /// Whether nothing was recorded
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

/// A texture owned by a node, one image per buffered frame.
///
/// [`OwnedTexture::ensure`] releases the previous images before allocating
/// new ones and does nothing when size and buffer count are unchanged.
#[derive(Debug, Clone, Default)]
pub struct OwnedTexture {
    label: String,
    format: TextureFormat,
    cube: bool,
    size: Extent,
    images: Vec<ResourceId>,
}

impl OwnedTexture {
    /// Create an unallocated 2D texture
    pub fn new(label: impl Into<String>, format: TextureFormat) -> Self {
        Self {
            label: label.into(),
            format,
            ..Self::default()
        }
    }

    /// Create an unallocated cube texture
    pub fn cube(label: impl Into<String>, format: TextureFormat) -> Self {
        Self {
            cube: true,
            ..Self::new(label, format)
        }
    }

    /// Make sure the texture has `size` and `buffer_count` images.
    ///
    /// Returns whether a reallocation happened.
    pub fn ensure(
        &mut self,
        backend: &dyn Backend,
        size: Extent,
        buffer_count: u32,
    ) -> Result<bool, BackendError> {
        let count = buffer_count.max(1) as usize;
        if self.size == size && self.images.len() == count {
            return Ok(false);
        }

        self.release(backend);
        if size.is_empty() {
            return Ok(true);
        }

        let desc = TextureDesc {
            label: self.label.clone(),
            size,
            format: self.format,
            cube: self.cube,
        };
        for _ in 0..count {
            match backend.create_texture(&desc) {
                Ok(id) => self.images.push(id),
                Err(e) => {
                    self.release(backend);
                    return Err(e);
                }
            }
        }
        self.size = size;
        Ok(true)
    }

    /// Image to use for a frame
    pub fn view(&self, frame_index: u64) -> Option<ResourceId> {
        if self.images.is_empty() {
            return None;
        }
        let slot = (frame_index % self.images.len() as u64) as usize;
        self.images.get(slot).copied()
    }

    /// Current size, zero when unallocated
    pub fn size(&self) -> Extent {
        self.size
    }

    /// Number of allocated images
    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    /// Whether images are allocated
    pub fn is_allocated(&self) -> bool {
        !self.images.is_empty()
    }

    /// Release all images
    pub fn release(&mut self, backend: &dyn Backend) {
        for id in self.images.drain(..) {
            backend.release(id);
        }
        self.size = Extent::ZERO;
    }
}

/// A buffer owned by a node, one allocation per buffered frame
#[derive(Debug, Clone, Default)]
pub struct OwnedBuffer {
    label: String,
    size: u64,
    buffers: Vec<ResourceId>,
}

impl OwnedBuffer {
    /// Create an unallocated buffer
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            ..Self::default()
        }
    }

    /// Make sure the buffer has `size` bytes and `buffer_count` copies.
    ///
    /// Returns whether a reallocation happened.
    pub fn ensure(
        &mut self,
        backend: &dyn Backend,
        size: u64,
        buffer_count: u32,
    ) -> Result<bool, BackendError> {
        let count = buffer_count.max(1) as usize;
        if self.size == size && self.buffers.len() == count {
            return Ok(false);
        }

        self.release(backend);
        if size == 0 {
            return Ok(true);
        }

        let desc = BufferDesc {
            label: self.label.clone(),
            size,
        };
        for _ in 0..count {
            match backend.create_buffer(&desc) {
                Ok(id) => self.buffers.push(id),
                Err(e) => {
                    self.release(backend);
                    return Err(e);
                }
            }
        }
        self.size = size;
        Ok(true)
    }

    /// Buffer to use for a frame
    pub fn view(&self, frame_index: u64) -> Option<ResourceId> {
        if self.buffers.is_empty() {
            return None;
        }
        let slot = (frame_index % self.buffers.len() as u64) as usize;
        self.buffers.get(slot).copied()
    }

    /// Size in bytes, zero when unallocated
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Release all copies
    pub fn release(&mut self, backend: &dyn Backend) {
        for id in self.buffers.drain(..) {
            backend.release(id);
        }
        self.size = 0;
    }
}
