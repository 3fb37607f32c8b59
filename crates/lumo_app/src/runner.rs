// SPDX-License-Identifier: MIT OR Apache-2.0
//! Headless frame loop.

use crate::config::LumoConfig;
use lumo_graph::{
    create_builtin_registry, Capability, CommandHandle, ConnectError, Context, DebugState,
    DocumentError, FrameContext, Graph, GraphDocument, GraphError, HeadlessBackend,
    HeadlessCommands, NodeParams, SlotHandle,
};
use std::sync::Arc;

/// Error running the driver
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    /// Building or resizing the graph failed
    #[error(transparent)]
    Graph(#[from] GraphError),

    /// Wiring the demo pipeline failed
    #[error(transparent)]
    Connect(#[from] ConnectError),

    /// Loading or saving the project failed
    #[error(transparent)]
    Document(#[from] DocumentError),
}

/// Totals of a run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunSummary {
    /// Frames executed
    pub frames: u64,
    /// Frames in which at least one node failed or ordering degraded
    pub degraded_frames: u64,
    /// Commands recorded over all frames
    pub commands: usize,
    /// Device resources alive at the end of the run
    pub live_resources: usize,
}

/// Owns the backend, the graph and the command recorder of a run
pub struct Runner {
    config: LumoConfig,
    backend: Arc<HeadlessBackend>,
    graph: Graph,
    commands: HeadlessCommands,
}

impl Runner {
    /// Build the graph described by the configuration and size it to the viewport
    pub fn new(config: LumoConfig) -> Result<Self, RunError> {
        let backend = Arc::new(HeadlessBackend::new());
        let context = Context::new(backend.clone(), create_builtin_registry());

        let mut graph = match &config.project {
            Some(path) => {
                tracing::info!("Loading project {}", path.display());
                let document = GraphDocument::load(path)?;
                Graph::from_document(context, &document)?
            }
            None => {
                let mut graph = Graph::new(context);
                build_demo_pipeline(&mut graph)?;
                graph
            }
        };

        let report = graph.resize_all(config.viewport, config.buffer_count)?;
        tracing::info!(
            "Graph ready: {} node(s), {} link(s), {} resized at {}",
            graph.node_count(),
            graph.link_count(),
            report.visited.len(),
            config.viewport
        );

        Ok(Self {
            config,
            backend,
            graph,
            commands: HeadlessCommands::new(),
        })
    }

    /// The graph being run
    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    /// Run the configured number of frames, then save the project if asked to
    pub fn run(&mut self) -> Result<RunSummary, RunError> {
        let mut summary = RunSummary::default();
        let debug = DebugState {
            trace_bindings: self.config.trace_bindings,
        };

        for frame_index in 0..self.config.frames {
            let mut frame = FrameContext::new(frame_index, CommandHandle::new(&mut self.commands))
                .with_debug(debug.clone());
            let report = self.graph.execute_frame(&mut frame);

            if !report.is_clean() {
                summary.degraded_frames += 1;
                tracing::warn!(
                    "Frame {frame_index}: {} failed, fallback {}, skipped {}",
                    report.failed.len(),
                    report.fallback,
                    report.skipped
                );
            }
            let recorded = self.commands.drain();
            tracing::debug!(
                "Frame {frame_index}: {} node(s), {} command(s)",
                report.executed.len(),
                recorded.len()
            );
            for command in &recorded {
                tracing::trace!("  {command}");
            }
            summary.commands += recorded.len();
            summary.frames += 1;
        }

        if let Some(path) = &self.config.save_project {
            self.graph.to_document().save(path)?;
        }

        summary.live_resources = self.backend.live_count();
        tracing::info!(
            "Ran {} frame(s), {} command(s), {} degraded frame(s)",
            summary.frames,
            summary.commands,
            summary.degraded_frames
        );
        Ok(summary)
    }
}

/// Fill -> blur -> composite -> present, with an animated blur radius and a
/// particle buffer on the side
pub fn build_demo_pipeline(graph: &mut Graph) -> Result<(), RunError> {
    let fill = graph.add_node_with("solid_color", NodeParams::default().named("Background"))?;
    let time = graph.add_node_with("time", NodeParams::default().at(0.0, 120.0))?;
    let blur = graph.add_node_with("blur", NodeParams::default().at(200.0, 0.0))?;
    let composite = graph.add_node_with("composite", NodeParams::default().at(400.0, 0.0))?;
    let present = graph.add_node_with("present", NodeParams::default().at(600.0, 0.0))?;
    graph.add_node_with("particles", NodeParams::default().at(200.0, 240.0))?;

    let tex_out = |node| SlotHandle::output(node, Capability::Texture2D, 0);
    graph.connect(tex_out(fill), SlotHandle::input(blur, Capability::Texture2D, 0))?;
    graph.connect(
        SlotHandle::output(time, Capability::Variable, 0),
        SlotHandle::input(blur, Capability::Variable, 0),
    )?;
    graph.connect(tex_out(fill), SlotHandle::input(composite, Capability::Texture2D, 0))?;
    graph.connect(tex_out(blur), SlotHandle::input(composite, Capability::Texture2D, 1))?;
    graph.connect(tex_out(composite), SlotHandle::input(present, Capability::Texture2D, 0))?;
    Ok(())
}
