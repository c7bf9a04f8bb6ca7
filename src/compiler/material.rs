//! Material and technique translation.
//!
//! Introspects a shader's declared property table and translates it into
//! one of the two PBR workflows through a fixed channel-name mapping table.
//! Texture, image and sampler resources all pass through the shared
//! registries, so a source asset referenced by any number of materials
//! produces at most one copy of each resource across the whole export.

use image::{Rgb, RgbImage, RgbaImage};
use std::io::Cursor;

use crate::document::{
    AttributeBinding, DocImage, DocMaterial, DocSampler, DocTexture, FilterMode, MaterialValue,
    ParamType, Program, Semantic, SideFile, Technique, TechniqueParameter, UniformBinding,
    WrapMode, Workflow,
};
use crate::document::Attributes;
use crate::errors::Result;
use crate::host::{MaterialData, PropertyValue, TextureData, TextureFilter, TextureWrap};
use crate::output::sanitize_name;
use crate::report::ExportWarning;

use super::{ExportContext, SmoothnessSource};

// ============================================================================
// Channel mapping tables
// ============================================================================

/// Host property → canonical channel names for the metal/roughness workflow.
const METAL_CHANNEL_MAP: &[(&str, &str)] = &[
    ("_MainTex", "baseColorTexture"),
    ("_MetallicGlossMap", "metallicTexture"),
    ("_BumpMap", "normalTexture"),
    ("_OcclusionMap", "aoTexture"),
    ("_EmissionMap", "emissiveTexture"),
    // Colors
    ("_Color", "baseColorFactor"),
    ("_EmissionColor", "emissiveFactor"),
    // Factors
    ("_Metallic", "metallicFactor"),
    ("_GlossMapScale", "roughnessFactor"),
    ("_Glossiness", "roughnessFactor"),
    ("_BumpScale", "normalFactor"),
    ("_OcclusionStrength", "aoFactor"),
];

/// Host property → canonical channel names for the specular/glossiness
/// workflow.
const SPECULAR_CHANNEL_MAP: &[(&str, &str)] = &[
    ("_MainTex", "diffuseTexture"),
    ("_SpecGlossMap", "specularTexture"),
    ("_BumpMap", "normalTexture"),
    ("_OcclusionMap", "aoTexture"),
    ("_EmissionMap", "emissiveTexture"),
    // Colors
    ("_Color", "diffuseFactor"),
    ("_SpecColor", "specularFactor"),
    ("_EmissionColor", "emissiveFactor"),
    // Factors
    ("_GlossMapScale", "glossinessFactor"),
    ("_Glossiness", "glossinessFactor"),
    ("_BumpScale", "normalFactor"),
    ("_OcclusionStrength", "aoFactor"),
];

/// Workflow selection by shader identity: the plain standard shader is
/// metal/roughness, its specular setup variant is specular/glossiness,
/// anything else is unsupported.
pub(crate) fn workflow_for_shader(shader: &str) -> Option<Workflow> {
    if shader == "Standard" {
        Some(Workflow::MetalRoughness)
    } else if shader.contains("Standard") {
        Some(Workflow::SpecularGlossiness)
    } else {
        None
    }
}

/// The channel-map lookup. Unsupported shaders fall back to the metal
/// table so at least the basic color channels translate.
fn channel_for(workflow: Option<Workflow>, property: &str) -> Option<&'static str> {
    let table = match workflow {
        Some(Workflow::SpecularGlossiness) => SPECULAR_CHANNEL_MAP,
        _ => METAL_CHANNEL_MAP,
    };
    table.iter().find(|(p, _)| *p == property).map(|(_, c)| *c)
}

/// Derives the single-channel smoothness image from a channel-packed map:
/// `1 − alpha` for the metal workflow (gloss → roughness), `alpha` for the
/// specular workflow, replicated across RGB.
#[must_use]
pub fn derive_smoothness_image(source: &RgbaImage, workflow: Workflow) -> RgbImage {
    let mut out = RgbImage::new(source.width(), source.height());
    for (dst, src) in out.pixels_mut().zip(source.pixels()) {
        let a = src.0[3];
        let v = match workflow {
            Workflow::MetalRoughness => 255 - a,
            Workflow::SpecularGlossiness => a,
        };
        *dst = Rgb([v, v, v]);
    }
    out
}

// ============================================================================
// Texture / image / sampler registration
// ============================================================================

fn sampler_of(tex: &TextureData) -> DocSampler {
    let wrap = match tex.wrap {
        TextureWrap::Repeat => WrapMode::Repeat,
        TextureWrap::Clamp => WrapMode::Clamp,
        TextureWrap::Mirror => WrapMode::Mirror,
    };
    let filter = match tex.filter {
        TextureFilter::Point => FilterMode::Nearest,
        TextureFilter::Bilinear | TextureFilter::Trilinear => FilterMode::Linear,
    };
    DocSampler {
        name: format!("sampler_{}", sanitize_name(&tex.name)),
        wrap_s: wrap,
        wrap_t: wrap,
        mag_filter: filter,
        min_filter: filter,
    }
}

fn register_sampler(ctx: &mut ExportContext, tex: &TextureData) -> usize {
    let sampler = sampler_of(tex);
    let name = sampler.name.clone();
    ctx.doc.samplers.register(&name, sampler)
}

fn fetch_texture<'s>(ctx: &mut ExportContext<'s>, name: &str) -> Option<&'s TextureData> {
    let Some(tex) = ctx.scene.textures.get(name) else {
        ctx.report.warn(ExportWarning::TextureNotFound { name: name.to_owned() });
        return None;
    };
    if !tex.readable {
        ctx.report.warn(ExportWarning::TextureNotReadable { name: name.to_owned() });
        return None;
    }
    Some(tex)
}

fn encode_png(pixels: &RgbaImage) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    pixels.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)?;
    Ok(buf)
}

fn encode_jpeg(pixels: &RgbImage, quality: u8) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    let encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(Cursor::new(&mut buf), quality);
    pixels.write_with_encoder(encoder)?;
    Ok(buf)
}

/// Registers a texture asset directly (no channel splitting): one sampler,
/// one image side file, one texture, all deduplicated by source name.
pub(crate) fn register_texture(
    ctx: &mut ExportContext,
    tex_name: &str,
    is_bump: bool,
) -> Result<Option<usize>> {
    let Some(tex) = fetch_texture(ctx, tex_name) else {
        return Ok(None);
    };

    let key = format!("texture_{}", sanitize_name(&tex.name));
    if let Some(i) = ctx.doc.textures.index_of(&key) {
        return Ok(Some(i));
    }

    let sampler = register_sampler(ctx, tex);

    let image_key = format!("image_{}", sanitize_name(&tex.name));
    let uri = format!("{}.png", sanitize_name(&tex.source_name));
    if !ctx.doc.images.contains(&image_key) {
        let data = encode_png(&tex.pixels)?;
        ctx.doc.side_files.push(SideFile { uri: uri.clone(), data });
    }
    let image = ctx
        .doc
        .images
        .register_with(&image_key, || DocImage { name: image_key.clone(), uri: uri.clone() });

    let y_up = is_bump && !tex.convert_to_normal_map;
    let texture = DocTexture { name: key.clone(), image, sampler, y_up };
    Ok(Some(ctx.doc.textures.register(&key, texture)))
}

/// Splits a channel-packed map into two independent image/texture pairs —
/// the RGB channel image and the derived smoothness image — sharing one
/// sampler. Returns `(rgb_texture, smoothness_texture)` indices.
pub(crate) fn split_packed_texture(
    ctx: &mut ExportContext,
    tex_name: &str,
    workflow: Workflow,
) -> Result<Option<(usize, usize)>> {
    let Some(tex) = fetch_texture(ctx, tex_name) else {
        return Ok(None);
    };

    let (rgb_suffix, smooth_suffix) = match workflow {
        Workflow::MetalRoughness => ("_metallic", "_roughness"),
        Workflow::SpecularGlossiness => ("_specular", "_glossiness"),
    };
    let stem = sanitize_name(&tex.name);
    let rgb_key = format!("texture_{stem}{rgb_suffix}");
    let smooth_key = format!("texture_{stem}{smooth_suffix}");
    if let (Some(rgb), Some(smooth)) =
        (ctx.doc.textures.index_of(&rgb_key), ctx.doc.textures.index_of(&smooth_key))
    {
        return Ok(Some((rgb, smooth)));
    }

    // Both textures use the same sampler.
    let sampler = register_sampler(ctx, tex);
    let quality = ctx.settings.jpeg_quality;

    let rgb_pixels =
        RgbImage::from_fn(tex.pixels.width(), tex.pixels.height(), |x, y| {
            let p = tex.pixels.get_pixel(x, y).0;
            Rgb([p[0], p[1], p[2]])
        });
    let smooth_pixels = derive_smoothness_image(&tex.pixels, workflow);

    let file_stem = sanitize_name(&tex.source_name);
    let register_half = |ctx: &mut ExportContext,
                             key: &str,
                             suffix: &str,
                             data: Vec<u8>|
     -> usize {
        let image_key = format!("image_{stem}{suffix}");
        let uri = format!("{file_stem}{suffix}.jpg");
        if !ctx.doc.images.contains(&image_key) {
            ctx.doc.side_files.push(SideFile { uri: uri.clone(), data });
        }
        let image = ctx
            .doc
            .images
            .register_with(&image_key, || DocImage { name: image_key.clone(), uri: uri.clone() });
        let texture = DocTexture { name: key.to_owned(), image, sampler, y_up: false };
        ctx.doc.textures.register(key, texture)
    };

    let rgb_data = encode_jpeg(&rgb_pixels, quality)?;
    let smooth_data = encode_jpeg(&smooth_pixels, quality)?;
    let rgb = register_half(ctx, &rgb_key, rgb_suffix, rgb_data);
    let smooth = register_half(ctx, &smooth_key, smooth_suffix, smooth_data);
    Ok(Some((rgb, smooth)))
}

// ============================================================================
// Technique & program generation
// ============================================================================

fn param_type_of(value: &PropertyValue) -> Option<ParamType> {
    match value {
        PropertyValue::Color(_) | PropertyValue::Vector(_) => Some(ParamType::FloatVec4),
        PropertyValue::Float(_) | PropertyValue::Range(_) => Some(ParamType::Float),
        PropertyValue::Texture(Some(_)) => Some(ParamType::Sampler2D),
        PropertyValue::Texture(None) => None,
    }
}

/// Generates the technique and program for a shader, once per distinct
/// shader identity. Attribute parameters mirror the accessors the mesh
/// actually populated.
fn register_technique(
    ctx: &mut ExportContext,
    mat: &MaterialData,
    workflow: Option<Workflow>,
    attrs: &Attributes,
) -> usize {
    let shader_id = sanitize_name(&mat.shader);
    let tech_name = format!("technique_{shader_id}");
    if let Some(i) = ctx.doc.techniques.index_of(&tech_name) {
        return i;
    }

    let mut parameters = Vec::new();
    let mut attributes = Vec::new();
    let mut uniforms = Vec::new();

    let mut attribute = |param: &str, ty: ParamType, semantic: Semantic| {
        parameters.push(TechniqueParameter {
            name: param.to_owned(),
            ty,
            semantic: Some(semantic),
        });
        attributes.push(AttributeBinding {
            name: format!("a_{param}"),
            param: param.to_owned(),
        });
    };
    attribute("position", ParamType::FloatVec3, Semantic::Position);
    if attrs.normal.is_some() {
        attribute("normal", ParamType::FloatVec3, Semantic::Normal);
    }
    let uv_semantics =
        [Semantic::Texcoord0, Semantic::Texcoord1, Semantic::Texcoord2, Semantic::Texcoord3];
    for (set, semantic) in uv_semantics.into_iter().enumerate() {
        if attrs.uv[set].is_some() {
            attribute(&format!("texcoord{set}"), ParamType::FloatVec2, semantic);
        }
    }

    // Default matrix uniforms.
    for (param, semantic, uniform) in [
        ("modelViewMatrix", Semantic::ModelView, "u_modelViewMatrix"),
        ("projectionMatrix", Semantic::Projection, "u_projectionMatrix"),
    ] {
        parameters.push(TechniqueParameter {
            name: param.to_owned(),
            ty: ParamType::FloatMat4,
            semantic: Some(semantic),
        });
        uniforms.push(UniformBinding { name: uniform.to_owned(), param: param.to_owned() });
    }

    // One uniform per mapped shader property.
    for prop in &mat.properties {
        let Some(channel) = channel_for(workflow, &prop.name) else {
            continue;
        };
        let Some(ty) = param_type_of(&prop.value) else {
            continue;
        };
        parameters.push(TechniqueParameter { name: channel.to_owned(), ty, semantic: None });
        uniforms.push(UniformBinding { name: prop.name.clone(), param: channel.to_owned() });
    }

    let program_name = format!("program_{shader_id}");
    let program = Program {
        name: program_name.clone(),
        attributes: attributes.iter().map(|a| a.name.clone()).collect(),
    };
    let program_idx = ctx.doc.programs.register(&program_name, program);

    let technique = Technique {
        name: tech_name.clone(),
        program: Some(program_idx),
        parameters,
        attributes,
        uniforms,
    };
    ctx.doc.techniques.register(&tech_name, technique)
}

// ============================================================================
// Material translation
// ============================================================================

/// Translates one host material into a document material, deduplicated by
/// source material identity. Returns the material's registry index, or
/// `None` when the material asset is missing.
pub(crate) fn translate_material(
    ctx: &mut ExportContext,
    mat_key: &str,
    node_name: &str,
    attrs: &Attributes,
) -> Result<Option<usize>> {
    let scene = ctx.scene;
    let Some(mat) = scene.materials.get(mat_key) else {
        ctx.report.warn(ExportWarning::MaterialNotFound {
            node: node_name.to_owned(),
            material: mat_key.to_owned(),
        });
        return Ok(None);
    };

    let key = format!("material_{}", sanitize_name(&mat.name));
    if let Some(i) = ctx.doc.materials.index_of(&key) {
        return Ok(Some(i));
    }

    let workflow = workflow_for_shader(&mat.shader);
    if workflow.is_none() {
        ctx.report.warn(ExportWarning::UnsupportedShader {
            material: mat.name.clone(),
            shader: mat.shader.clone(),
        });
    }
    let is_metal = workflow == Some(Workflow::MetalRoughness);
    let packed_prop = if is_metal { "_MetallicGlossMap" } else { "_SpecGlossMap" };
    let has_packed_map = workflow.is_some() && mat.get_texture(packed_prop).is_some();

    // Whether smoothness is authoritative in the packed map's alpha or the
    // albedo's alpha: the host's per-material channel selector wins, the
    // configured policy is the fallback.
    let packed_alpha = match mat.get_float("_SmoothnessTextureChannel") {
        Some(v) => v == 0.0,
        None => ctx.settings.smoothness_source == SmoothnessSource::PackedMapAlpha,
    };

    let mut material = DocMaterial {
        name: mat.name.clone(),
        workflow,
        values: Vec::new(),
        technique: None,
        extra_floats: Vec::new(),
        extra_strings: Vec::new(),
    };

    for prop in &mat.properties {
        let name = prop.name.as_str();
        // The smoothness factor comes from the map scale when a packed map
        // exists, from the plain scalar otherwise; the redundant one is
        // dropped.
        if (name == "_Glossiness" && has_packed_map) || (name == "_GlossMapScale" && !has_packed_map)
        {
            continue;
        }
        let Some(channel) = channel_for(workflow, name) else {
            continue;
        };

        match &prop.value {
            PropertyValue::Color(c) => {
                let mut color = *c;
                // The host ignores the specular color's alpha.
                if name == "_SpecColor" {
                    color.w = 1.0;
                }
                material.values.push(MaterialValue::Color { channel: channel.to_owned(), value: color });
            }
            PropertyValue::Vector(v) => {
                material.values.push(MaterialValue::Vector { channel: channel.to_owned(), value: *v });
            }
            PropertyValue::Float(f) | PropertyValue::Range(f) => {
                let mut value = *f;
                // Source scalars are glossiness-based, the metal workflow
                // is roughness-based.
                if is_metal && (name == "_GlossMapScale" || name == "_Glossiness") {
                    value = 1.0 - value;
                }
                material.values.push(MaterialValue::Float { channel: channel.to_owned(), value });
            }
            PropertyValue::Texture(Some(tex_name)) => {
                let split = workflow.is_some()
                    && ((packed_alpha && name == packed_prop)
                        || (!packed_alpha && name == "_MainTex"));
                if split {
                    let wf = workflow.unwrap_or(Workflow::MetalRoughness);
                    if let Some((rgb, smooth)) = split_packed_texture(ctx, tex_name, wf)? {
                        material.values.push(MaterialValue::Texture {
                            channel: channel.to_owned(),
                            texture: rgb,
                            tex_coord: None,
                        });
                        let smooth_channel =
                            if is_metal { "roughnessTexture" } else { "glossinessTexture" };
                        material.values.push(MaterialValue::Texture {
                            channel: smooth_channel.to_owned(),
                            texture: smooth,
                            tex_coord: None,
                        });
                    }
                } else {
                    if name == "_MainTex" && mat.get_float("_Mode").unwrap_or(0.0) != 0.0 {
                        let mode = if mat.get_float("_Mode") == Some(1.0) {
                            "alphaMask"
                        } else {
                            "alphaBlend"
                        };
                        material.extra_strings.push(("blendMode".to_owned(), mode.to_owned()));
                        if let Some(cutoff) = mat.get_float("_Cutoff") {
                            material.extra_floats.push(("cutoff".to_owned(), cutoff));
                        }
                    }
                    let is_bump = name == "_BumpMap";
                    if let Some(texture) = register_texture(ctx, tex_name, is_bump)? {
                        let channel = if is_bump {
                            let converted = scene
                                .textures
                                .get(tex_name)
                                .is_some_and(|t| t.convert_to_normal_map);
                            if converted { "bumpTexture" } else { "normalTexture" }
                        } else {
                            channel
                        };
                        material.values.push(MaterialValue::Texture {
                            channel: channel.to_owned(),
                            texture,
                            tex_coord: None,
                        });
                    }
                }
            }
            PropertyValue::Texture(None) => {}
        }
    }

    material.technique = Some(register_technique(ctx, mat, workflow, attrs));
    Ok(Some(ctx.doc.materials.register(&key, material)))
}

/// Binds a renderer's lightmap to an already-registered material: the
/// lightmap texture goes into the ambient-occlusion channel on the fifth
/// UV set. No-op when the material already carries an aoTexture.
pub(crate) fn attach_lightmap(
    ctx: &mut ExportContext,
    material: usize,
    texture_name: &str,
) -> Result<()> {
    let already_bound = ctx
        .doc
        .materials
        .get(material)
        .is_some_and(|m| m.value("aoTexture").is_some());
    if already_bound {
        return Ok(());
    }
    if let Some(texture) = register_texture(ctx, texture_name, false)? {
        if let Some(mat) = ctx.doc.materials.get_mut(material) {
            mat.values.push(MaterialValue::Texture {
                channel: "aoTexture".to_owned(),
                texture,
                tex_coord: Some(4),
            });
        }
    }
    Ok(())
}
