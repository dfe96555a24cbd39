use std::fs;
use std::path::Path;
use std::process::Command;

use graphscene::GraphTile;
use graphscene::tile::encode_binary;

const TILE_JSON: &str = r#"{
  "coords": {
    "nodes": [[0, 0], [120, 40], [-80, 90], [40, -110]],
    "edges": [[0, 1, 200], [0, 2, 120], [1, 3, 60]]
  },
  "labels": ["center", "east", "south", "north"]
}"#;

fn run_render(tile: &Path, output: &Path, extra: &[&str]) -> std::process::Output {
    Command::new(env!("CARGO_BIN_EXE_graphscene"))
        .arg("render")
        .arg("--tile")
        .arg(tile)
        .arg("--output")
        .arg(output)
        .args(["--frames", "3", "--width", "160", "--height", "120"])
        .args(extra)
        .output()
        .expect("Failed to execute graphscene")
}

#[test]
fn renders_json_tile_to_png() {
    let dir = tempfile::tempdir().unwrap();
    let tile = dir.path().join("graph.json");
    fs::write(&tile, TILE_JSON).unwrap();
    let output = dir.path().join("frames").join("frame.png");

    let result = run_render(&tile, &output, &[]);
    assert!(result.status.success(), "graphscene exited with error: {result:?}");

    let image = image::open(&output).expect("frame.png is not a readable image");
    assert_eq!((image.width(), image.height()), (160, 120));

    let stdout = String::from_utf8_lossy(&result.stdout);
    assert!(stdout.contains("Rendered 4 nodes"), "unexpected status line: {stdout}");
}

#[test]
fn renders_binary_tile_with_layout_and_focus() {
    let dir = tempfile::tempdir().unwrap();
    let tile = GraphTile::from_json_str(TILE_JSON).unwrap();
    let path = dir.path().join("graph.bin");
    fs::write(&path, encode_binary(&tile)).unwrap();
    let output = dir.path().join("frame.png");

    let result = run_render(&path, &output, &["--layout", "concentric", "--focus", "1"]);
    assert!(result.status.success(), "graphscene exited with error: {result:?}");
    assert!(output.exists());
}

#[test]
fn unknown_config_format_fails() {
    let dir = tempfile::tempdir().unwrap();
    let tile = dir.path().join("graph.json");
    fs::write(&tile, TILE_JSON).unwrap();
    let config = dir.path().join("engine.toml");
    fs::write(&config, "backend = 'cpu'").unwrap();
    let output = dir.path().join("frame.png");

    let result = run_render(&tile, &output, &["--config", config.to_str().unwrap()]);
    assert!(!result.status.success());
    assert!(!output.exists());
}

#[test]
fn yaml_config_sets_background() {
    let dir = tempfile::tempdir().unwrap();
    let tile = dir.path().join("graph.json");
    fs::write(&tile, r#"{"coords": {"nodes": [], "edges": []}}"#).unwrap();
    let config = dir.path().join("engine.yaml");
    fs::write(&config, "background: \"#ff0000\"\n").unwrap();
    let output = dir.path().join("frame.png");

    let result = run_render(&tile, &output, &["--config", config.to_str().unwrap()]);
    assert!(result.status.success(), "graphscene exited with error: {result:?}");

    let image = image::open(&output).unwrap().to_rgba8();
    assert_eq!(image.get_pixel(80, 60).0, [255, 0, 0, 255]);
}
