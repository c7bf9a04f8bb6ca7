//! Animation clip compilation.
//!
//! Each clip attached to a transform becomes one document animation whose
//! channels target that transform. Curves are either passed through at
//! their authored keyframe times or resampled at a fixed rate, and every
//! spatial value runs through the coordinate converter.

use crate::document::{AnimationChannel, ChannelOutput, DocAnimation};
use crate::host::{ClipSource, CurveTrack, SourceTransform, TrackValues};
use crate::output::sanitize_name;
use crate::report::ExportWarning;

use super::ExportContext;

/// Evaluates a curve at an arbitrary time by interpolating between the
/// surrounding keyframes. Times outside the keyframe range clamp to the
/// nearest endpoint.
fn sample_track(track: &CurveTrack, t: f32) -> (usize, f32) {
    let times = &track.times;
    if t <= times[0] {
        return (0, 0.0);
    }
    let last = times.len() - 1;
    if t >= times[last] {
        return (last, 0.0);
    }
    // First keyframe at or past t; times are sorted.
    let hi = times.partition_point(|&k| k < t);
    let lo = hi - 1;
    let span = times[hi] - times[lo];
    let alpha = if span > f32::EPSILON { (t - times[lo]) / span } else { 0.0 };
    (lo, alpha)
}

fn bake_output(track: &CurveTrack, sample_times: &[f32]) -> ChannelOutput {
    match &track.values {
        TrackValues::Vec3(values) => ChannelOutput::Vec3(
            sample_times
                .iter()
                .map(|&t| {
                    let (lo, alpha) = sample_track(track, t);
                    if alpha == 0.0 {
                        values[lo]
                    } else {
                        values[lo].lerp(values[lo + 1], alpha)
                    }
                })
                .collect(),
        ),
        TrackValues::Quat(values) => ChannelOutput::Quat(
            sample_times
                .iter()
                .map(|&t| {
                    let (lo, alpha) = sample_track(track, t);
                    if alpha == 0.0 {
                        values[lo]
                    } else {
                        values[lo].slerp(values[lo + 1], alpha)
                    }
                })
                .collect(),
        ),
    }
}

fn compile_clip(ctx: &mut ExportContext, tr: &SourceTransform, clip: &ClipSource) {
    let mut channels = Vec::new();
    for track in &clip.tracks {
        if track.times.is_empty() {
            continue;
        }
        let (times, output) = if ctx.settings.bake_animation {
            let rate = ctx.settings.bake_sample_rate.max(1.0);
            let duration = clip.duration();
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            let samples = ((duration * rate).ceil() as usize).max(1) + 1;
            let times: Vec<f32> = (0..samples)
                .map(|i| (i as f32 / rate).min(duration))
                .collect();
            let output = bake_output(track, &times);
            (times, output)
        } else {
            let output = match &track.values {
                TrackValues::Vec3(v) => ChannelOutput::Vec3(v.clone()),
                TrackValues::Quat(q) => ChannelOutput::Quat(q.clone()),
            };
            (track.times.clone(), output)
        };

        let output = match (track.path, output) {
            (crate::document::ChannelPath::Translation, ChannelOutput::Vec3(v)) => {
                ChannelOutput::Vec3(v.into_iter().map(|p| ctx.convert.position(p)).collect())
            }
            (crate::document::ChannelPath::Rotation, ChannelOutput::Quat(q)) => {
                ChannelOutput::Quat(q.into_iter().map(|r| ctx.convert.quat(r)).collect())
            }
            // Scale is unaffected by the handedness change; mismatched
            // value kinds pass through untouched.
            (_, output) => output,
        };

        channels.push(AnimationChannel { path: track.path, times, output });
    }

    if channels.is_empty() {
        ctx.report.warn(ExportWarning::EmptyClip {
            clip: clip.name.clone(),
            node: tr.name.clone(),
        });
        return;
    }

    let key = format!(
        "animation_{}_{}",
        sanitize_name(&clip.name),
        sanitize_name(&tr.name)
    );
    let animation = DocAnimation {
        name: format!("{}_{}", clip.name, tr.name),
        target: tr.name.clone(),
        target_index: None,
        channels,
    };
    ctx.doc.animations.register(&key, animation);
}

/// Compiles every clip attached to a transform. A no-op when animation
/// export is disabled.
pub(crate) fn compile_clips(ctx: &mut ExportContext, tr: &SourceTransform) {
    if !ctx.settings.export_animation || !tr.has_clips() {
        return;
    }
    for clip in &tr.clips {
        compile_clip(ctx, tr, clip);
    }
}
