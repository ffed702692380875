//! Headless compositor driving the scene
//!
//! Creates one main view and render target per configured output, populates
//! the scene with synthetic client windows and runs the frame loop at the
//! configured refresh rate. Every tick, clients commit fresh buffers with
//! random damage, and each output that has something to repaint goes
//! through `pre_paint -> paint -> post_paint -> frame`. Presenting copies
//! the target into the output's front buffer, timed by a [`SwapProfiler`].

use anyhow::{Context, Result};
use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use std::cell::Cell;
use std::rc::Rc;
use std::time::{Duration, Instant};
use tokio::signal;
use tokio::time::{interval, MissedTickBehavior};

use crate::config::TesseraConfig;
use crate::geometry::{PointF, Rect, Region, Size, SizeF};
use crate::renderer::{
    BufferingMode, OutputFrame, PaintOutcome, RenderStats, RenderTarget, SoftwareRenderer,
    SwapProfiler,
};
use crate::scene::{
    Borders, BufferFormat, DecorationContent, GraphicsBuffer, ItemId, ItemKind, Scene,
    SceneEvent, ShadowContent, SurfaceItem, ViewId,
};

const SURFACE_SIZE: Size = Size::new(320, 240);
const SHADOW_RADIUS: f64 = 12.0;
const BORDERS: Borders = Borders {
    left: 4.0,
    top: 24.0,
    right: 4.0,
    bottom: 4.0,
};

/// Per-output counters
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct OutputStats {
    pub name: String,
    pub frames: u64,
    pub direct_scanouts: u64,
    /// Last buffering verdict of the swap profiler
    pub buffering: Option<BufferingMode>,
    pub mean_swap_us: u64,
}

/// Counters reported when the compositor stops
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct FrameStats {
    /// Ticks of the frame loop
    pub ticks: u64,
    /// Output frames painted
    pub painted_frames: u64,
    /// Output frames skipped for lack of repaints
    pub idle_frames: u64,
    pub composited_nodes: u64,
    /// Device pixels repainted over all outputs
    pub repainted_pixels: u64,
    /// Frame callbacks delivered to surfaces
    pub frame_callbacks: u64,
    pub outputs: Vec<OutputStats>,
    pub renderer: RenderStats,
}

struct HeadlessOutput {
    name: String,
    view: ViewId,
    target: RenderTarget,
    front: Vec<u8>,
    profiler: Option<SwapProfiler>,
    sequence: u64,
    stats: OutputStats,
}

impl HeadlessOutput {
    /// Copies the painted target to the front buffer
    fn present(&mut self) {
        if let Some(profiler) = self.profiler.as_mut() {
            profiler.begin();
        }
        self.front.clear();
        self.front.extend_from_slice(self.target.pixmap().data());
        if let Some(profiler) = self.profiler.as_mut() {
            if let Some(mode) = profiler.end() {
                self.stats.buffering = Some(mode);
            }
            self.stats.mean_swap_us = profiler.mean().as_micros() as u64;
        }
    }
}

/// A synthetic client window: shadow, decoration and one surface
#[derive(Debug, Clone, Copy)]
struct DemoWindow {
    window: ItemId,
    surface: ItemId,
    hue: u8,
}

/// Compositor without a display server, rendering into memory
pub struct HeadlessCompositor {
    config: TesseraConfig,
    scene: Scene,
    outputs: Vec<HeadlessOutput>,
    windows: Vec<DemoWindow>,
    rng: StdRng,
    started: Instant,
    frame_callbacks: Rc<Cell<u64>>,
    stats: FrameStats,
}

impl HeadlessCompositor {
    pub fn new(config: TesseraConfig) -> Result<Self> {
        info!("🏗️ Initializing headless compositor...");
        config.validate()?;

        let settings = config.scene.to_settings()?;
        let renderer = SoftwareRenderer::with_background(settings.background);
        let mut scene = Scene::new(Box::new(renderer), settings);

        let frame_callbacks = Rc::new(Cell::new(0));
        let callbacks = Rc::clone(&frame_callbacks);
        scene.subscribe(move |event| match event {
            SceneEvent::FramePainted { .. } => callbacks.set(callbacks.get() + 1),
            SceneEvent::PixmapFailed { item, error } => {
                warn!("⚠️ Surface {:?} has no texture: {}", item, error)
            }
            _ => {}
        });

        let mut outputs = Vec::with_capacity(config.outputs.len());
        for output in &config.outputs {
            debug!(
                "🖥️ Output {} {}x{} @ ({}, {}) scale {}",
                output.name, output.width, output.height, output.x, output.y, output.scale
            );
            let view = scene
                .add_main_view(&output.name, output.viewport(), output.scale)
                .with_context(|| format!("Failed to create view for output {}", output.name))?;
            let mut target = RenderTarget::new(output.width, output.height)
                .with_context(|| format!("Failed to allocate target for output {}", output.name))?;
            target.set_allows_scanout(config.scene.direct_scanout);
            let profiler = config.profiler.enabled.then(|| {
                SwapProfiler::with_settings(
                    config.profiler.samples,
                    config.profiler.blocking_threshold(),
                )
            });
            outputs.push(HeadlessOutput {
                name: output.name.clone(),
                view,
                target,
                front: Vec::new(),
                profiler,
                sequence: 0,
                stats: OutputStats {
                    name: output.name.clone(),
                    ..OutputStats::default()
                },
            });
        }

        let mut compositor = Self {
            rng: StdRng::seed_from_u64(config.demo.seed),
            config,
            scene,
            outputs,
            windows: Vec::new(),
            started: Instant::now(),
            frame_callbacks,
            stats: FrameStats::default(),
        };
        for index in 0..compositor.config.demo.windows {
            compositor.map_window(index)?;
        }

        info!(
            "✅ Headless compositor ready: {} outputs, {} windows",
            compositor.outputs.len(),
            compositor.windows.len()
        );
        Ok(compositor)
    }

    /// Maps a client window in a cascade on the first output
    fn map_window(&mut self, index: u32) -> Result<()> {
        let root = self.scene.tree().root();
        let origin = self
            .config
            .outputs
            .first()
            .map(|output| PointF::new(output.x as f64, output.y as f64))
            .unwrap_or_default();
        let position = PointF::new(
            origin.x + 40.0 + 60.0 * index as f64,
            origin.y + 40.0 + 40.0 * index as f64,
        );
        let frame_size = SizeF::new(
            SURFACE_SIZE.width as f64 + BORDERS.left + BORDERS.right,
            SURFACE_SIZE.height as f64 + BORDERS.top + BORDERS.bottom,
        );

        let window = self.scene.create_item(root, ItemKind::Container)?;
        self.scene.set_position(window, position)?;
        self.scene.set_size(window, frame_size)?;

        let shadow = self.scene.create_item(
            window,
            ItemKind::Content(Box::new(ShadowContent {
                radius: SHADOW_RADIUS,
                color: [0, 0, 0, 96],
            })),
        )?;
        self.scene.set_z(shadow, -1)?;
        self.scene
            .set_position(shadow, PointF::new(-SHADOW_RADIUS, -SHADOW_RADIUS))?;
        self.scene.set_size(
            shadow,
            SizeF::new(
                frame_size.width + 2.0 * SHADOW_RADIUS,
                frame_size.height + 2.0 * SHADOW_RADIUS,
            ),
        )?;

        let decoration = self.scene.create_item(
            window,
            ItemKind::Content(Box::new(DecorationContent {
                borders: BORDERS,
                color: [48, 48, 56, 255],
            })),
        )?;
        self.scene.set_size(decoration, frame_size)?;

        let surface = self
            .scene
            .create_item(window, ItemKind::Surface(SurfaceItem::new()))?;
        self.scene
            .set_position(surface, PointF::new(BORDERS.left, BORDERS.top))?;
        self.scene.set_size(
            surface,
            SizeF::new(SURFACE_SIZE.width as f64, SURFACE_SIZE.height as f64),
        )?;

        let demo = DemoWindow {
            window,
            surface,
            hue: (index as u8).wrapping_mul(53),
        };
        let full = Region::from_rect(Rect::new(0, 0, SURFACE_SIZE.width, SURFACE_SIZE.height));
        self.scene
            .commit_buffer(surface, Some(Rc::new(demo_buffer(demo.hue))), &full)?;
        self.windows.push(demo);
        debug!("🪟 Mapped window {} at {:?}", index, position);
        Ok(())
    }

    /// Lets every client commit a new buffer with random damage
    fn update_clients(&mut self) -> Result<()> {
        let rects = self.config.demo.damage_rects_per_frame;
        for demo in self.windows.iter_mut() {
            if rects == 0 {
                break;
            }
            demo.hue = demo.hue.wrapping_add(1);
            let mut damage = Region::new();
            for _ in 0..rects {
                let x = self.rng.gen_range(0..SURFACE_SIZE.width);
                let y = self.rng.gen_range(0..SURFACE_SIZE.height);
                let w = self.rng.gen_range(1..=SURFACE_SIZE.width - x);
                let h = self.rng.gen_range(1..=SURFACE_SIZE.height - y);
                damage.add_rect(Rect::new(x, y, w, h));
            }
            self.scene
                .commit_buffer(demo.surface, Some(Rc::new(demo_buffer(demo.hue))), &damage)?;
        }
        Ok(())
    }

    /// One vblank: client updates, then a frame on every output with repaints
    pub fn tick(&mut self) -> Result<()> {
        self.stats.ticks += 1;
        self.update_clients()?;

        let pending = self.scene.views_needing_repaint();
        let (active, idle): (Vec<usize>, Vec<usize>) =
            (0..self.outputs.len()).partition(|index| pending.contains(&self.outputs[*index].view));
        self.stats.idle_frames += idle.len() as u64;

        let mut regions = Vec::with_capacity(active.len());
        for &index in &active {
            let view = self.outputs[index].view;
            regions.push(self.scene.pre_paint(view)?);
        }

        for (&index, region) in active.iter().zip(&regions) {
            let output = &mut self.outputs[index];
            match self.scene.paint(output.view, &mut output.target, region)? {
                PaintOutcome::Composited { nodes } => {
                    self.stats.composited_nodes += nodes as u64;
                    self.stats.repainted_pixels += region.area().max(0) as u64;
                }
                PaintOutcome::DirectScanout(item) => {
                    debug!("📺 {} scans out {:?} directly", output.name, item);
                    output.stats.direct_scanouts += 1;
                }
            }
        }

        for &index in &active {
            let output = &mut self.outputs[index];
            if self.scene.post_paint(output.view)? {
                debug!("🎞️ {} is animating", output.name);
            }
            output.present();
            output.sequence += 1;
            output.stats.frames += 1;
            let frame = OutputFrame::new(output.sequence, self.started.elapsed());
            self.scene.frame(output.view, &frame)?;
        }
        self.stats.painted_frames += active.len() as u64;
        Ok(())
    }

    /// Runs the frame loop until the configured frame count is reached or
    /// the process is interrupted
    pub async fn run(&mut self) -> Result<FrameStats> {
        info!("🎬 Starting frame loop");
        let frames = u64::from(self.config.general.frames);
        let mut ticker = interval(self.config.general.frame_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let shutdown = signal::ctrl_c();
        tokio::pin!(shutdown);

        while frames == 0 || self.stats.ticks < frames {
            tokio::select! {
                result = &mut shutdown => {
                    result.context("Failed to listen for Ctrl+C")?;
                    info!("📨 Received Ctrl+C, shutting down gracefully");
                    break;
                }
                _ = ticker.tick() => self.tick()?,
            }
        }

        let stats = self.stats();
        info!(
            "🛑 Frame loop finished after {} ticks ({} frames painted, {} idle)",
            stats.ticks, stats.painted_frames, stats.idle_frames
        );
        Ok(stats)
    }

    pub fn stats(&self) -> FrameStats {
        let renderer = self
            .scene
            .renderer()
            .as_any()
            .downcast_ref::<SoftwareRenderer>()
            .map(SoftwareRenderer::stats)
            .unwrap_or_default();
        FrameStats {
            frame_callbacks: self.frame_callbacks.get(),
            outputs: self.outputs.iter().map(|output| output.stats.clone()).collect(),
            renderer,
            ..self.stats.clone()
        }
    }

    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    /// Last painted contents of an output
    pub fn target(&self, output: &str) -> Option<&RenderTarget> {
        self.outputs
            .iter()
            .find(|candidate| candidate.name == output)
            .map(|candidate| &candidate.target)
    }

    /// Window and surface items of the demo clients
    pub fn windows(&self) -> Vec<(ItemId, ItemId)> {
        self.windows
            .iter()
            .map(|demo| (demo.window, demo.surface))
            .collect()
    }

    /// Time spent in frames so far
    pub fn uptime(&self) -> Duration {
        self.started.elapsed()
    }
}

fn demo_buffer(hue: u8) -> GraphicsBuffer {
    let rgba = [hue, 255 - hue, 160, 255];
    GraphicsBuffer::solid(SURFACE_SIZE, BufferFormat::Xrgb8888, rgba)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DemoConfig, OutputConfig};

    fn test_config(windows: u32, damage_rects_per_frame: u32) -> TesseraConfig {
        let mut config = TesseraConfig::default();
        config.general.frames = 3;
        config.general.refresh_rate = 1000;
        config.outputs = vec![OutputConfig {
            name: "HEADLESS-1".to_string(),
            x: 0,
            y: 0,
            width: 640,
            height: 480,
            scale: 1.0,
        }];
        config.demo = DemoConfig {
            windows,
            seed: 7,
            damage_rects_per_frame,
        };
        config
    }

    #[tokio::test]
    async fn test_run_renders_requested_frames() -> Result<()> {
        let mut compositor = HeadlessCompositor::new(test_config(2, 1))?;
        let stats = compositor.run().await?;

        assert_eq!(stats.ticks, 3);
        assert_eq!(stats.painted_frames, 3);
        assert_eq!(stats.outputs[0].frames, 3);
        // the top-most surface is never occluded, the first frame paints both
        assert!(stats.frame_callbacks >= 4);
        assert!(stats.renderer.nodes > 0);
        Ok(())
    }

    #[test]
    fn test_idle_outputs_are_skipped() -> Result<()> {
        let mut compositor = HeadlessCompositor::new(test_config(1, 0))?;
        compositor.tick()?;
        compositor.tick()?;

        let stats = compositor.stats();
        assert_eq!(stats.painted_frames, 1);
        assert_eq!(stats.idle_frames, 1);
        Ok(())
    }

    #[test]
    fn test_window_contents_reach_the_target() -> Result<()> {
        let mut compositor = HeadlessCompositor::new(test_config(1, 0))?;
        compositor.tick()?;

        let target = compositor.target("HEADLESS-1").context("missing output")?;
        // surface starts at (40 + 4, 40 + 24)
        assert_eq!(target.pixel(100, 100), Some([0, 255, 160, 255]));
        // decoration title bar
        assert_eq!(target.pixel(100, 50), Some([48, 48, 56, 255]));
        // background outside every window
        assert_eq!(target.pixel(630, 470), Some([0, 0, 0, 255]));
        assert!(compositor.target("HEADLESS-2").is_none());
        Ok(())
    }

    #[test]
    fn test_two_outputs_share_a_frame() -> Result<()> {
        let mut config = test_config(1, 1);
        config.outputs.push(OutputConfig {
            name: "HEADLESS-2".to_string(),
            x: 640,
            y: 0,
            width: 800,
            height: 600,
            scale: 1.5,
        });
        let mut compositor = HeadlessCompositor::new(config)?;
        compositor.tick()?;
        compositor.tick()?;

        let stats = compositor.stats();
        assert_eq!(stats.outputs.len(), 2);
        assert_eq!(stats.outputs[0].frames, 2);
        // second output paints its initial frame, then has nothing to do
        assert_eq!(stats.outputs[1].frames, 1);
        assert_eq!(stats.idle_frames, 1);
        Ok(())
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let mut config = test_config(0, 0);
        config.outputs[0].scale = -1.0;
        assert!(HeadlessCompositor::new(config).is_err());
    }
}
