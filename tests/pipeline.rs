//! End-to-end tests: directory packs → pre-pack snapshot → generated pack.

use dynamic_asset_gen::color::alpha_blend;
use dynamic_asset_gen::config::GeneratorConfig;
use dynamic_asset_gen::imaging::pointwise::{argb_at, to_rgba};
use dynamic_asset_gen::imaging::{decode_png, encode_png};
use dynamic_asset_gen::pack::{DirectoryPack, GeneratedPack, PackResources, PrePackRepository};
use dynamic_asset_gen::types::{Identifier, PackType};
use image::RgbaImage;
use serde_json::{Value, json};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

const BASE: u32 = 0xFF20_40C0;
const TINT: u32 = 0x80FF_0000;

fn id(text: &str) -> Identifier {
    text.parse().unwrap()
}

fn write(root: &Path, relative: &str, bytes: &[u8]) {
    let path = root.join(relative);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, bytes).unwrap();
}

fn write_json(root: &Path, relative: &str, value: Value) {
    write(root, relative, &serde_json::to_vec_pretty(&value).unwrap());
}

fn png(width: u32, height: u32, color: impl Fn(u32, u32) -> u32) -> Vec<u8> {
    let image = RgbaImage::from_fn(width, height, |x, y| to_rgba(color(x, y)));
    encode_png(&image).unwrap()
}

/// Publish `packs` (lowest priority first) under a fresh generated pack.
fn stack(packs: &[&Path], config: &GeneratorConfig) -> Arc<GeneratedPack> {
    let repository = Arc::new(PrePackRepository::new());
    let generated = Arc::new(GeneratedPack::from_config(repository.clone(), config));
    let mut published: Vec<Arc<dyn PackResources>> = vec![generated.clone() as Arc<dyn PackResources>];
    for dir in packs.iter().rev() {
        published.push(Arc::new(DirectoryPack::new(*dir)));
    }
    repository.publish(published);
    generated
}

/// A flat 100×100 source with a marker pixel at (10, 10), a 50×50
/// translucent tint, and a document cropping then tinting the source.
fn crop_overlay_pack(root: &Path) {
    write(
        root,
        "assets/a/textures/block/source.png",
        &png(100, 100, |x, y| if (x, y) == (10, 10) { 0xFFFF_FFFF } else { BASE }),
    );
    write(root, "assets/a/textures/block/tint.png", &png(50, 50, |_, _| TINT));
    write_json(
        root,
        "assets/a/dynamic_asset_generator/tinted.json",
        json!({
            "type": "texture",
            "output_location": "a:block/tinted",
            "input": {
                "type": "overlay",
                "inputs": [
                    {
                        "type": "crop",
                        "total_size": 100,
                        "start_x": 10,
                        "size_x": 50,
                        "start_y": 10,
                        "size_y": 50,
                        "input": {"type": "file", "path": "a:block/source"}
                    },
                    {"type": "file", "path": "a:block/tint"}
                ]
            }
        }),
    );
}

#[test]
fn crop_then_overlay_is_cached_across_plans() {
    let packs = TempDir::new().unwrap();
    let cache = TempDir::new().unwrap();
    crop_overlay_pack(packs.path());
    let config = GeneratorConfig {
        cache_assets: true,
        cache_dir: cache.path().to_string_lossy().into_owned(),
        ..GeneratorConfig::default()
    };
    let output = id("a:textures/block/tinted.png");

    let first = stack(&[packs.path()], &config);
    let bytes = first.get_resource(PackType::Assets, &output).unwrap();
    let image = decode_png(&bytes).unwrap();
    assert_eq!(image.dimensions(), (50, 50));
    assert_eq!(argb_at(&image, 0, 0), alpha_blend(TINT, 0xFFFF_FFFF));
    assert_eq!(argb_at(&image, 49, 49), alpha_blend(TINT, BASE));
    let stats = first.stats();
    assert_eq!((stats.hits, stats.misses), (0, 1));
    assert!(stats.node_evaluations > 0);

    let second = stack(&[packs.path()], &config);
    let assets = PackType::Assets;
    assert_eq!(
        first.planner(assets).fingerprint(&output),
        second.planner(assets).fingerprint(&output)
    );
    assert_eq!(second.get_resource(assets, &output).unwrap(), bytes);
    let stats = second.stats();
    assert_eq!((stats.hits, stats.misses), (1, 0));
    assert_eq!(stats.node_evaluations, 0);
}

#[test]
fn changed_input_regenerates_after_reset() {
    let packs = TempDir::new().unwrap();
    crop_overlay_pack(packs.path());
    let pack = stack(&[packs.path()], &GeneratorConfig::default());
    let output = id("a:textures/block/tinted.png");
    let before = pack.get_resource(PackType::Assets, &output).unwrap();

    write(packs.path(), "assets/a/textures/block/tint.png", &png(50, 50, |_, _| 0xFF00_FF00));
    assert_eq!(pack.get_resource(PackType::Assets, &output).unwrap(), before);

    pack.reset(PackType::Assets);
    let after = decode_png(&pack.get_resource(PackType::Assets, &output).unwrap()).unwrap();
    assert_eq!(argb_at(&after, 25, 25), 0xFF00_FF00);
}

#[test]
fn higher_pack_overrides_inputs() {
    let base = TempDir::new().unwrap();
    let resource_pack = TempDir::new().unwrap();
    crop_overlay_pack(base.path());
    write(
        resource_pack.path(),
        "assets/a/textures/block/tint.png",
        &png(50, 50, |_, _| 0xFF00_00FF),
    );
    let pack = stack(&[base.path(), resource_pack.path()], &GeneratorConfig::default());
    let image = decode_png(
        &pack
            .get_resource(PackType::Assets, &id("a:textures/block/tinted.png"))
            .unwrap(),
    )
    .unwrap();
    assert_eq!(argb_at(&image, 0, 0), 0xFF00_00FF);
}

#[test]
fn conditional_tag_follows_pack_contents() {
    let packs = TempDir::new().unwrap();
    write_json(
        packs.path(),
        "data/a/dynamic_asset_generator/ores.json",
        json!({
            "type": "tag",
            "tag": "a:blocks/ores",
            "members": [
                "a:copper_ore",
                {"id": "a:tin_ore", "when": {"resource_exists": "a:recipes/tin.json"}},
                {"id": "a:lead_ore", "when": {"not": {"resource_exists": "a:recipes/tin.json"}}}
            ]
        }),
    );
    let pack = stack(&[packs.path()], &GeneratorConfig::default());
    let output = id("a:tags/blocks/ores.json");

    let values = |pack: &GeneratedPack| -> Value {
        serde_json::from_slice::<Value>(&pack.get_resource(PackType::Data, &output).unwrap())
            .unwrap()["values"]
            .clone()
    };
    assert_eq!(values(pack.as_ref()), json!(["a:copper_ore", "a:lead_ore"]));

    write(packs.path(), "data/a/recipes/tin.json", b"{}");
    pack.reset(PackType::Data);
    assert_eq!(values(pack.as_ref()), json!(["a:copper_ore", "a:tin_ore"]));
}

#[test]
fn oversized_crop_is_served_as_absent() {
    let packs = TempDir::new().unwrap();
    write(packs.path(), "assets/a/textures/block/dot.png", &png(1, 1, |_, _| BASE));
    write_json(
        packs.path(),
        "assets/a/dynamic_asset_generator/huge.json",
        json!({
            "type": "texture",
            "output_location": "a:block/huge",
            "input": {
                "type": "crop",
                "total_size": 1,
                "start_x": 0,
                "size_x": 4_000_000_000u32,
                "start_y": 0,
                "size_y": 4_000_000_000u32,
                "input": {"type": "file", "path": "a:block/dot"}
            }
        }),
    );
    let pack = stack(&[packs.path()], &GeneratorConfig::default());
    let output = id("a:textures/block/huge.png");
    assert!(pack.has_resource(PackType::Assets, &output));
    assert!(pack.get_resource(PackType::Assets, &output).is_none());
}

#[test]
fn animated_texture_and_its_metadata_agree() {
    let packs = TempDir::new().unwrap();
    let root = packs.path();
    let frames = |colors: &'static [u32]| {
        png(2, 2 * colors.len() as u32, move |_, y| colors[(y / 2) as usize])
    };
    write(root, "assets/a/textures/block/lava.png", &frames(&[0xFFFF_0000, 0xFFAA_0000]));
    write(
        root,
        "assets/a/textures/block/lava.png.mcmeta",
        br#"{"animation": {"frametime": 4, "frames": [0, 1]}}"#,
    );
    write(
        root,
        "assets/a/textures/block/glow.png",
        &frames(&[0x0000_0000, 0x80FF_FFFF, 0xFFFF_FFFF]),
    );
    write(
        root,
        "assets/a/textures/block/glow.png.mcmeta",
        br#"{"animation": {"frames": [0, 1, 2]}}"#,
    );
    write_json(
        root,
        "assets/a/dynamic_asset_generator/glowing_lava.json",
        json!({
            "type": "texture",
            "output_location": "a:block/glowing_lava",
            "input": {
                "type": "animation_splitter",
                "sources": {
                    "lava": {"source": {"type": "file", "path": "a:block/lava"}},
                    "glow": {"source": {"type": "file", "path": "a:block/glow"}}
                },
                "generator": {
                    "type": "overlay",
                    "inputs": [
                        {"type": "frame_capture", "capture": "lava"},
                        {"type": "frame_capture", "capture": "glow"}
                    ]
                }
            }
        }),
    );
    write_json(
        root,
        "assets/a/dynamic_asset_generator/glowing_lava_meta.json",
        json!({
            "type": "texture_meta",
            "output_location": "a:block/glowing_lava",
            "sources": ["a:block/lava", "a:block/glow"]
        }),
    );
    let pack = stack(&[root], &GeneratorConfig::default());

    let strip = pack
        .get_resource(PackType::Assets, &id("a:textures/block/glowing_lava.png"))
        .unwrap();
    let strip = decode_png(&strip).unwrap();
    assert_eq!(strip.dimensions(), (2, 12));
    assert_eq!(argb_at(&strip, 0, 0), 0xFFFF_0000);
    assert_eq!(argb_at(&strip, 0, 2), alpha_blend(0x80FF_FFFF, 0xFFAA_0000));
    assert_eq!(argb_at(&strip, 1, 5), 0xFFFF_FFFF);

    let meta = pack
        .get_resource(PackType::Assets, &id("a:textures/block/glowing_lava.png.mcmeta"))
        .unwrap();
    let meta: Value = serde_json::from_slice(&meta).unwrap();
    assert_eq!(
        meta,
        json!({"animation": {"frametime": 4, "frames": [0, 1, 2, 3, 4, 5], "interpolate": false}})
    );
}
