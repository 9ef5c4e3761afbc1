//! API object model (§3): handles, object kinds, and the per-kind state payload an object
//! carries. Grounded on the teacher's `render/src/handle.rs` typed-handle pattern, generalized
//! from a single-API handle family to the full GL+Vulkan kind enumeration this spec names.

use std::fmt;

/// A 32-bit handle minted by the captured application. `0` is reserved for "none/default".
#[derive(Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct Handle(pub u32);

impl Handle {
    pub const NONE: Handle = Handle(0);

    /// Marks the top bit of a handle's 32-bit value so virtual/reserved objects (e.g. the
    /// default renderbuffer a context is born with) can be recognized without a separate table
    /// (§4.7.5: "skips virtual/reserved handles (e.g., default renderbuffer with top-bit-set
    /// sentinel)"). The application never mints a handle in this range.
    const RESERVED_BIT: u32 = 0x8000_0000;

    pub fn reserved(id: u32) -> Handle {
        Handle(Handle::RESERVED_BIT | id)
    }

    pub fn is_none(&self) -> bool {
        self.0 == 0
    }

    pub fn is_reserved(&self) -> bool {
        self.0 & Handle::RESERVED_BIT != 0
    }
}

impl fmt::Debug for Handle {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Handle({})", self.0)
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum ObjectKind {
    Buffer,
    Texture,
    Renderbuffer,
    Framebuffer,
    Shader,
    Program,
    Sampler,
    VertexArray,
    Query,
    Sync,
    Image,
    ImageView,
    DeviceMemory,
    CommandBuffer,
    CommandPool,
    Pipeline,
    PipelineLayout,
    DescriptorSet,
    DescriptorSetLayout,
    DescriptorPool,
    RenderPass,
    Event,
    Fence,
    Semaphore,
    Swapchain,
    Surface,
    Instance,
    PhysicalDevice,
    Device,
    Queue,
    ShaderModule,
}

impl ObjectKind {
    /// Whether objects of this kind live in a per-device shared table rather than a
    /// per-context table (§3 Object invariant). GL-family objects that are explicitly
    /// shareable across contexts with a shared-objects table; Vulkan-family objects (scoped to
    /// a device, not a GL context) count as shared here too since they have no per-context home.
    pub fn is_shareable(&self) -> bool {
        !matches!(self, ObjectKind::VertexArray | ObjectKind::Query | ObjectKind::Sync)
    }
}

/// Opaque creation-time parameters; stored as captured rather than interpreted eagerly, since
/// different kinds need wildly different payloads and the dependency graph only ever needs to
/// know that *some* object exists at a handle, not reinterpret its construction arguments.
#[derive(Clone, Debug, Default)]
pub struct CreationParams {
    pub args: Vec<i64>,
    pub label: Option<String>,
}

#[derive(Clone, Debug)]
pub struct Object {
    pub handle: Handle,
    pub kind: ObjectKind,
    pub creation: CreationParams,
    pub shareable: bool,
    /// Set when a delete of a bound, shareable object is deferred until it is unbound
    /// elsewhere (§3 Lifecycle).
    pub pending_delete: bool,
}

impl Object {
    pub fn new(handle: Handle, kind: ObjectKind) -> Object {
        Object {
            handle,
            shareable: kind.is_shareable(),
            kind,
            creation: CreationParams::default(),
            pending_delete: false,
        }
    }
}
