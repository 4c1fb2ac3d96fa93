use std::path::PathBuf;
use std::sync::Arc;

use pollster::block_on;
use serde_json::json;

use pixelbox_host::{
    Button, Controller, GameHost, HostOptions, LocalPlayer, TickStatus, WindowViewport,
};

fn boot_bunnies() -> GameHost {
    let dir = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("demos/bunnies");
    let player = LocalPlayer::from_dir(dir, Arc::new(WindowViewport::new(512, 288))).unwrap();
    block_on(GameHost::boot(Box::new(player), HostOptions::default())).unwrap()
}

fn angle(host: &mut GameHost) -> f64 {
    host.state_for_agent().unwrap()["angle"].as_f64().unwrap()
}

#[test]
fn bunnies_fill_a_centered_grid() {
    let host = boot_bunnies();
    assert_eq!((host.width(), host.height()), (128, 72));

    let grid = host.stage().child(0).expect("grid container");
    assert_eq!(grid.child_count(), 25);

    let mut host = host;
    assert_eq!(
        host.state_for_agent().unwrap(),
        json!({ "x": 64.0, "y": 36.0, "angle": 0.0 })
    );
}

#[test]
fn right_turns_the_grid_clockwise() {
    let mut host = boot_bunnies();
    host.play();

    let mut pad = Controller::new();
    pad.press(Button::Right);
    for _ in 0..30 {
        let report = host.frame(std::slice::from_ref(&pad), 1.0 / 60.0, true);
        assert!(!matches!(
            report,
            pixelbox_host::FrameReport::Dispatched {
                tick: TickStatus::FaultReported,
                ..
            }
        ));
    }
    assert!((angle(&mut host) - 45.0).abs() < 0.01);

    let saved = host.save_state().unwrap();
    pad.release(Button::Right);
    pad.press(Button::A);
    host.frame(std::slice::from_ref(&pad), 1.0 / 60.0, true);
    assert_eq!(angle(&mut host), 0.0);

    host.load_state(&saved).unwrap();
    assert!((angle(&mut host) - 45.0).abs() < 0.01);
    assert!(!host.state().fault_reported());
}

#[test]
fn composited_frame_reaches_the_screen() {
    let mut host = boot_bunnies();
    host.play();
    host.frame(&[Controller::new()], 1.0 / 60.0, true);

    let renderer = host.renderer().borrow();
    assert_eq!(renderer.screen_size(), (512, 288));
    let pixels = renderer.pixels(None).expect("software screen");
    assert!(pixels.iter().any(|px| *px == [0xff, 0xff, 0xff, 0xff]));
}
