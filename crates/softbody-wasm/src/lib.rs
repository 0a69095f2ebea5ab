use glam::{Mat4, Vec3, Vec4};
use rand::rngs::StdRng;
use rand::SeedableRng;
use softbody_core::forces::star::StarShell;
use softbody_core::forces::{Radial, Uniform};
use softbody_core::materials::MaterialPreset;
use softbody_core::mesh::{
    EmbeddingRecord, ElementBlock, ElementType, MeshKind, MeshLoadParams, MeshSpec, NodeBlock,
};
use softbody_core::particle::State;
use softbody_core::proxy::{Aabb, Attachment, CollisionProxy};
use softbody_core::scheduler::{FrameGuard, FrameReader, SimulationScheduler};
use softbody_core::{SimConfig, Simulation, SimulationBuilder};
use wasm_bindgen::prelude::*;

/// Capsules kept by the collision proxy.
const PROXY_CAPACITY: usize = 64;

/// GPU-compatible particle struct: 32 bytes, matches the WGSL particle layout.
#[repr(C)]
#[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
struct GpuParticle {
    position: [f32; 3], // 12 bytes
    radius: f32,        //  4 bytes
    velocity: [f32; 3], // 12 bytes
    state: u32,         //  4 bytes
}

enum Gravity {
    Uniform(Vec3),
    Radial(Vec3),
}

/// `[compliance, density]` of a named material preset.
#[wasm_bindgen]
pub fn material_preset(name: &str) -> Option<Box<[f32]>> {
    MaterialPreset::by_name(name).map(|m| vec![m.compliance, m.density].into_boxed_slice())
}

fn to_vec3s(flat: &[f32], what: &str) -> Result<Vec<Vec3>, JsError> {
    if flat.len() % 3 != 0 {
        return Err(JsError::new(&format!(
            "{what}: length {} is not a multiple of 3",
            flat.len()
        )));
    }
    Ok(flat.chunks_exact(3).map(Vec3::from_slice).collect())
}

/// Column-major 4x4 matrix, or `None` for an empty slice.
fn to_mat4(flat: &[f32]) -> Result<Option<Mat4>, JsError> {
    match flat.len() {
        0 => Ok(None),
        16 => Ok(Some(Mat4::from_cols_slice(flat))),
        n => Err(JsError::new(&format!("transform: expected 16 floats, got {n}"))),
    }
}

/// A soft-body world: meshes are loaded and embedded first, then `build`
/// starts the simulation and `step` advances it.
#[wasm_bindgen]
pub struct SoftBodyWorld {
    builder: Option<SimulationBuilder>,
    scheduler: Option<SimulationScheduler>,
    reader: Option<FrameReader>,
    frame: Option<FrameGuard>,
    proxy: CollisionProxy,
    attachments: Vec<Attachment>,
    /// State each attached particle had before it was pinned, parallel to `attachments`.
    pinned_states: Vec<State>,
    gravity: Gravity,
    gpu_buffer: Vec<GpuParticle>,
    embedding: Vec<EmbeddingRecord>,
}

#[wasm_bindgen]
impl SoftBodyWorld {
    #[wasm_bindgen(constructor)]
    pub fn new(substeps: u32, gravity: f32, frame_count: usize) -> SoftBodyWorld {
        let config = SimConfig {
            substeps,
            gravity,
            frame_count,
            ..SimConfig::default()
        };
        SoftBodyWorld {
            builder: Some(Simulation::builder(config)),
            scheduler: None,
            reader: None,
            frame: None,
            proxy: CollisionProxy::with_capacity(PROXY_CAPACITY),
            attachments: Vec::new(),
            pinned_states: Vec::new(),
            gravity: Gravity::Uniform(Vec3::Y),
            gpu_buffer: Vec::new(),
            embedding: Vec::new(),
        }
    }

    /// Spawn dormant stars on a shell. Without a seed the shell is random.
    #[wasm_bindgen]
    pub fn add_stars(
        &mut self,
        count: usize,
        shell_radius: f32,
        speed: f32,
        seed: Option<u32>,
    ) -> Result<u32, JsError> {
        let shell = StarShell {
            count,
            shell_radius,
            speed,
            ..StarShell::default()
        };
        let mut rng = match seed {
            Some(seed) => StdRng::seed_from_u64(u64::from(seed)),
            None => StdRng::from_entropy(),
        };
        let range = self.builder_mut()?.add_star_particles(&shell, &mut rng)?;
        Ok(range.end - range.start)
    }

    /// Load a mesh from flat node and element arrays.
    ///
    /// `positions` holds xyz per node tag, `connectivity` holds `element_nodes`
    /// tags per element. Returns 3 for tetrahedral and 2 for triangular meshes.
    #[wasm_bindgen]
    pub fn load_mesh(
        &mut self,
        name: &str,
        node_tags: &[u64],
        positions: &[f32],
        element_dim: u32,
        element_nodes: usize,
        connectivity: &[u64],
        compliance: f32,
        density: f32,
        static_tags: &[u64],
        transform: &[f32],
    ) -> Result<u32, JsError> {
        let spec = MeshSpec::single(
            NodeBlock {
                tags: node_tags.to_vec(),
                positions: to_vec3s(positions, "positions")?,
            },
            ElementBlock {
                element_type: ElementType {
                    dimension: element_dim,
                    node_count: element_nodes,
                },
                connectivity: connectivity.to_vec(),
            },
        );
        let mut params = MeshLoadParams::new(compliance, density)
            .with_static_tags(static_tags.iter().copied());
        if let Some(transform) = to_mat4(transform)? {
            params = params.with_transform(transform);
        }

        let kind = self.builder_mut()?.load_mesh(name, &spec, &params)?;
        web_sys::console::log_1(
            &format!("mesh [{}] loaded: {} nodes", name, node_tags.len()).into(),
        );
        Ok(match kind {
            MeshKind::Triangular => 2,
            MeshKind::Tetrahedral => 3,
        })
    }

    /// Embed visual vertices into a loaded mesh; the records are read through
    /// `embedding_ptr` until the next call.
    #[wasm_bindgen]
    pub fn embed(&mut self, name: &str, positions: &[f32], transform: &[f32]) -> Result<usize, JsError> {
        let positions = to_vec3s(positions, "positions")?;
        let transform = to_mat4(transform)?;
        self.embedding = match (&self.builder, &self.scheduler) {
            (Some(builder), _) => builder.embed(name, &positions, transform)?,
            (None, Some(scheduler)) => scheduler.simulation().embed(name, &positions, transform)?,
            (None, None) => return Err(JsError::new("world is not initialized")),
        };
        Ok(self.embedding.len())
    }

    #[wasm_bindgen]
    pub fn embedding_ptr(&self) -> *const u32 {
        self.embedding.as_ptr() as *const u32
    }

    #[wasm_bindgen]
    pub fn embedding_byte_length(&self) -> usize {
        std::mem::size_of_val(self.embedding.as_slice())
    }

    /// Finish loading and start the simulation.
    #[wasm_bindgen]
    pub fn build(&mut self) -> Result<(), JsError> {
        let builder = self
            .builder
            .take()
            .ok_or_else(|| JsError::new("world is already built"))?;
        let simulation = builder.build()?;
        web_sys::console::log_1(
            &format!(
                "WASM SoftBodyWorld built: {} particles",
                simulation.particles().count
            )
            .into(),
        );
        let scheduler = SimulationScheduler::new(simulation);
        self.reader = Some(scheduler.reader());
        self.scheduler = Some(scheduler);
        self.write_gpu_output();
        Ok(())
    }

    /// Advance one step and refresh the GPU buffer. Returns the elapsed milliseconds.
    #[wasm_bindgen]
    pub fn step(&mut self, dt: f32) -> Result<f32, JsError> {
        let start = js_sys::Date::now();
        // Release the frame held since the last step so the slot can be reused.
        self.frame = None;
        let scheduler = self
            .scheduler
            .as_mut()
            .ok_or_else(|| JsError::new("world is not built"))?;
        match self.gravity {
            Gravity::Uniform(direction) => {
                scheduler.step(dt, &Uniform(direction), &self.proxy, &self.attachments)
            }
            Gravity::Radial(center) => {
                scheduler.step(dt, &Radial { center }, &self.proxy, &self.attachments)
            }
        };
        self.frame = self.reader.as_ref().and_then(FrameReader::latest);
        self.write_gpu_output();
        Ok((js_sys::Date::now() - start) as f32)
    }

    /// Step number of the frame currently held, 0 if none.
    #[wasm_bindgen]
    pub fn frame_step(&self) -> u64 {
        self.frame.as_ref().map_or(0, |frame| frame.step)
    }

    /// Release the held frame before the next step.
    #[wasm_bindgen]
    pub fn release_frame(&mut self) {
        self.frame = None;
    }

    #[wasm_bindgen]
    pub fn get_gpu_buffer_ptr(&self) -> *const f32 {
        self.gpu_buffer.as_ptr() as *const f32
    }

    #[wasm_bindgen]
    pub fn get_gpu_buffer_byte_length(&self) -> usize {
        self.gpu_buffer.len() * std::mem::size_of::<GpuParticle>()
    }

    #[wasm_bindgen]
    pub fn particle_count(&self) -> usize {
        match (&self.builder, &self.scheduler) {
            (Some(builder), _) => builder.particles().count,
            (None, Some(scheduler)) => scheduler.simulation().particles().count,
            (None, None) => 0,
        }
    }

    /// Constant gravity along `(x, y, z)`, scaled by the configured `g`.
    #[wasm_bindgen]
    pub fn set_gravity_direction(&mut self, x: f32, y: f32, z: f32) {
        self.gravity = Gravity::Uniform(Vec3::new(x, y, z));
    }

    /// Radial gravity around a center; negative `g` pulls toward it.
    #[wasm_bindgen]
    pub fn set_radial_gravity(&mut self, x: f32, y: f32, z: f32) {
        self.gravity = Gravity::Radial(Vec3::new(x, y, z));
    }

    /// Rebuild the capsules from `(x, y, z, radius)` spheres and index pairs.
    #[wasm_bindgen]
    pub fn set_skeleton(&mut self, spheres: &[f32], pairs: &[u32]) -> usize {
        let spheres: Vec<Vec4> = spheres.chunks_exact(4).map(Vec4::from_slice).collect();
        let pairs: Vec<[u32; 2]> = pairs.chunks_exact(2).map(|p| [p[0], p[1]]).collect();
        self.proxy.set_skeleton(&spheres, &pairs)
    }

    #[wasm_bindgen]
    pub fn add_box_obstacle(
        &mut self,
        min_x: f32, min_y: f32, min_z: f32,
        max_x: f32, max_y: f32, max_z: f32,
    ) {
        self.proxy.push_obstacle(Aabb::new(
            Vec3::new(min_x, min_y, min_z),
            Vec3::new(max_x, max_y, max_z),
        ));
    }

    #[wasm_bindgen]
    pub fn clear_colliders(&mut self) {
        self.proxy.clear();
    }

    /// Pin a mesh node to a target; the particle becomes kinematic.
    #[wasm_bindgen]
    pub fn attach(&mut self, name: &str, tag: u64, x: f32, y: f32, z: f32) -> Result<(), JsError> {
        let target = Vec3::new(x, y, z);
        let attachment = self.simulation_mut()?.attachment(name, tag, target)?;

        let existing = self
            .attachments
            .iter()
            .position(|a| a.particle == attachment.particle);
        match existing {
            Some(index) => self.attachments[index].target = target,
            None => {
                let previous = self.simulation_mut()?.pin(attachment.particle);
                self.attachments.push(attachment);
                self.pinned_states.push(previous);
            }
        }
        Ok(())
    }

    /// Drop all attachments and hand their particles back in the state they had.
    #[wasm_bindgen]
    pub fn clear_attachments(&mut self) -> Result<(), JsError> {
        let attachments = std::mem::take(&mut self.attachments);
        let previous = std::mem::take(&mut self.pinned_states);
        let simulation = self.simulation_mut()?;
        for (attachment, state) in attachments.into_iter().zip(previous) {
            simulation.release(attachment.particle, state);
        }
        Ok(())
    }

    #[wasm_bindgen]
    pub fn activate_stars(&mut self) -> Result<(), JsError> {
        self.simulation_mut()?.activate_stars();
        Ok(())
    }

    #[wasm_bindgen]
    pub fn attract_stars(&mut self) -> Result<(), JsError> {
        self.simulation_mut()?.attract_stars();
        Ok(())
    }

    #[wasm_bindgen]
    pub fn set_star_target(&mut self, x: f32, y: f32, z: f32) -> Result<(), JsError> {
        self.simulation_mut()?.set_star_target(Vec3::new(x, y, z));
        Ok(())
    }

    /// Stars absorbed so far.
    #[wasm_bindgen]
    pub fn absorbed(&self) -> u32 {
        self.scheduler
            .as_ref()
            .map_or(0, |scheduler| scheduler.simulation().absorbed())
    }
}

impl SoftBodyWorld {
    fn builder_mut(&mut self) -> Result<&mut SimulationBuilder, JsError> {
        self.builder
            .as_mut()
            .ok_or_else(|| JsError::new("world is already built"))
    }

    fn simulation_mut(&mut self) -> Result<&mut Simulation, JsError> {
        self.scheduler
            .as_mut()
            .map(SimulationScheduler::simulation_mut)
            .ok_or_else(|| JsError::new("world is not built"))
    }

    fn write_gpu_output(&mut self) {
        let Some(scheduler) = &self.scheduler else {
            return;
        };
        let particles = scheduler.simulation().particles();
        self.gpu_buffer.clear();
        self.gpu_buffer.extend((0..particles.count).map(|i| {
            let position = match &self.frame {
                Some(frame) => frame.particles[i].position,
                None => particles.position[i].to_array(),
            };
            GpuParticle {
                position,
                radius: particles.radius[i],
                velocity: particles.velocity[i].to_array(),
                state: particles.state[i] as u32,
            }
        }));
    }
}
