use anyhow::{anyhow, Context, Result};
use glam::{Mat4, Vec4};
use kestrel_rig::assets::ModelRegistry;
use kestrel_rig::config::{RuntimeConfig, RuntimeOverrides};
use kestrel_rig::renderer::{DrawCall, MemoryUniformTarget, UniformStream};
use kestrel_rig::time::Time;
use kestrel_rig::{FrameSchedule, PlaybackState, SkeletalMesh};
use serde::Serialize;
use serde_json::json;
use std::env;
use std::process;

const MODEL_KEY: &str = "inspect";

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    if let Err(err) = run() {
        eprintln!("rig_inspect error: {err:?}");
        process::exit(1);
    }
}

struct CliOptions {
    model: Option<String>,
    animation: Option<String>,
    frames: u32,
    dt: f32,
    config: Option<String>,
    json: bool,
    show_help: bool,
    overrides: RuntimeOverrides,
}

#[derive(Default, Serialize)]
struct RunSummary {
    frames: u32,
    draws: usize,
    pushes: u64,
    rejected: u64,
    bytes_uploaded: u64,
    peak_staged: usize,
    final_time: f32,
    finished: bool,
}

fn run() -> Result<()> {
    let args: Vec<String> = env::args().skip(1).collect();
    let options = parse_cli_args(&args)?;
    if options.show_help {
        print_usage();
        return Ok(());
    }
    let model_path = options.model.as_deref().ok_or_else(|| anyhow!("missing <model.gltf> argument"))?;

    let mut config = match options.config.as_deref() {
        Some(path) => RuntimeConfig::load(path)?,
        None => RuntimeConfig::default(),
    };
    if !options.overrides.is_empty() {
        log::info!("[rig_inspect] CLI overrides: {}", options.overrides.applied_fields().join(", "));
        config.apply_overrides(&options.overrides);
        config.validate().context("CLI overrides produced an invalid config")?;
    }

    let mut registry = ModelRegistry::new();
    registry.retain_model(MODEL_KEY, Some(model_path))?;
    let asset = registry.model(MODEL_KEY).ok_or_else(|| anyhow!("model '{model_path}' vanished after load"))?;
    let mesh_node = asset
        .default_mesh_node()
        .ok_or_else(|| anyhow!("model '{model_path}' has no mesh-bearing node"))?;

    let mut mesh = SkeletalMesh::with_playback(asset.clone(), mesh_node, &config.playback)?;
    let clip = match options.animation.as_deref() {
        Some(name) => Some(name.to_string()),
        None => asset.animations().first().map(|animation| animation.name.to_string()),
    };
    if let Some(name) = clip.as_deref() {
        if !mesh.play_default(name) {
            let available: Vec<&str> = asset.animations().iter().map(|a| a.name.as_ref()).collect();
            return Err(anyhow!("animation '{name}' not found (available: {})", available.join(", ")));
        }
    }

    if !options.json {
        println!(
            "Model '{}' ({} nodes, {} skins, {} animations); mesh node '{}'",
            asset.name,
            asset.node_count(),
            asset.skins().len(),
            asset.animations().len(),
            asset.nodes()[mesh_node].name
        );
        match mesh.animation_name() {
            Some(name) => println!(
                "Playing '{name}' ({:.3}s, speed {}, looping {})",
                mesh.total_animation_time(),
                mesh.speed(),
                mesh.is_looping()
            ),
            None => println!("No animation; rendering bind pose"),
        }
    }

    let stream = UniformStream::from_config(MemoryUniformTarget::new(), &config.stream)?;
    let mut frames = FrameSchedule::new(stream);
    let mut time = Time::fixed(options.dt);
    let mut summary = RunSummary::default();

    for _ in 0..options.frames {
        time.tick();
        frames.begin_frame()?;
        let slice = mesh.update(time.delta_seconds(), Mat4::IDENTITY, Vec4::ONE, frames.updates()?);
        frames.end_updates()?;

        let mut draws = 0usize;
        let mut renderer = |call: DrawCall<'_>| {
            draws += 1;
            log::debug!(
                "[rig_inspect] draw node {} mesh {} ({} indices) at offset {} in buffer {}",
                call.node,
                call.mesh,
                call.primitive.index_count,
                call.uniforms.offset,
                call.uniforms.buffer
            );
        };
        mesh.draw(frames.draws()?, &mut renderer);
        summary.draws += draws;
        summary.frames += 1;

        let matrices = mesh.resolve();
        let read_buffer = frames.stream().read_index();
        if options.json {
            let joint0 = matrices.joints.first().map(|m| m.to_cols_array());
            println!(
                "{}",
                json!({
                    "frame": frames.frame(),
                    "time": mesh.time(),
                    "state": state_label(mesh.state()),
                    "joints": matrices.joints.len(),
                    "roots": matrices.roots.len(),
                    "offset": slice.map(|s| s.offset),
                    "buffer": read_buffer,
                    "draws": draws,
                    "joint0": joint0,
                })
            );
        } else {
            println!(
                "frame {:>4}  t={:.4}  {:<8} joints={} roots={} offset={} buffer={} draws={}",
                frames.frame(),
                mesh.time(),
                state_label(mesh.state()),
                matrices.joints.len(),
                matrices.roots.len(),
                slice.map(|s| s.offset.to_string()).unwrap_or_else(|| "-".to_string()),
                read_buffer,
                draws
            );
        }
    }

    let stats = frames.stream().stats();
    summary.pushes = stats.pushes;
    summary.rejected = stats.rejected;
    summary.bytes_uploaded = stats.bytes_uploaded;
    summary.peak_staged = stats.peak_staged;
    summary.final_time = mesh.time();
    summary.finished = mesh.is_finished();
    if options.json {
        println!("{}", json!({ "summary": summary }));
    } else {
        println!(
            "Ran {} frames: {} draws, {} pushes ({} rejected), {} bytes uploaded, peak {} bytes staged",
            summary.frames,
            summary.draws,
            summary.pushes,
            summary.rejected,
            summary.bytes_uploaded,
            summary.peak_staged
        );
    }
    registry.release_model(MODEL_KEY);
    Ok(())
}

fn state_label(state: PlaybackState) -> &'static str {
    match state {
        PlaybackState::Stopped => "stopped",
        PlaybackState::Playing => "playing",
        PlaybackState::Paused => "paused",
    }
}

fn print_usage() {
    eprintln!(
        "Rig Inspect

Usage:
  rig_inspect <model.gltf> [--animation NAME] [--frames N] [--dt S] [--speed X]
              [--no-loop] [--config PATH] [--json]

Loads a glTF model, plays one animation through the skeletal mesh pipeline for N
fixed-step frames and prints per-frame playback and uniform stream state. Without
--animation the first animation in the file is played.
"
    );
}

fn parse_cli_args(args: &[String]) -> Result<CliOptions> {
    let mut options = CliOptions {
        model: None,
        animation: None,
        frames: 60,
        dt: 1.0 / 60.0,
        config: None,
        json: false,
        show_help: false,
        overrides: RuntimeOverrides::default(),
    };
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--animation" => options.animation = Some(flag_value(&mut iter, arg)?.to_string()),
            "--frames" => {
                let value = flag_value(&mut iter, arg)?;
                options.frames = value.parse().with_context(|| format!("invalid --frames value '{value}'"))?;
            }
            "--dt" => {
                let value = flag_value(&mut iter, arg)?;
                let dt: f32 = value.parse().with_context(|| format!("invalid --dt value '{value}'"))?;
                if !dt.is_finite() || dt < 0.0 {
                    return Err(anyhow!("--dt must be a non-negative number (got {value})"));
                }
                options.dt = dt;
            }
            "--speed" => {
                let value = flag_value(&mut iter, arg)?;
                options.overrides.speed =
                    Some(value.parse().with_context(|| format!("invalid --speed value '{value}'"))?);
            }
            "--no-loop" => options.overrides.looping = Some(false),
            "--config" => options.config = Some(flag_value(&mut iter, arg)?.to_string()),
            "--json" => options.json = true,
            "--help" | "-h" => options.show_help = true,
            _ if arg.starts_with("--") => {
                return Err(anyhow!("unknown flag '{arg}'"));
            }
            _ => {
                if options.model.is_some() {
                    return Err(anyhow!("unexpected extra argument '{arg}'"));
                }
                options.model = Some(arg.clone());
            }
        }
    }
    Ok(options)
}

fn flag_value<'a>(iter: &mut std::slice::Iter<'a, String>, flag: &str) -> Result<&'a str> {
    iter.next().map(|value| value.as_str()).ok_or_else(|| anyhow!("{flag} requires a value"))
}
