//! Viewport command - print the visible region and tile box for a camera.

use globeview::coord::TileScheme;
use globeview::viewport::{compute_viewport_bbox_and_tile_box, visible_polygon};

use super::common::{load_config, ViewportArgs};
use crate::error::CliError;

/// Run the viewport command.
pub fn run(args: ViewportArgs) -> Result<(), CliError> {
    let config = load_config()?;
    let geometry = config.viewport_geometry()?;
    let scheme = args.projection(&config);
    let state = args.state(geometry)?;

    let polygon = visible_polygon(&state);
    let (bbox, tile_box) = compute_viewport_bbox_and_tile_box(
        &state,
        &scheme,
        config.provider.min_zoom..=config.provider.max_zoom,
    );

    println!("Viewport");
    println!("========");
    println!();
    println!("Center:   {}", state.center());
    println!("Zoom:     {:.4}", state.zoom());
    println!(
        "Distance: {:.6} ({:.4} radii)",
        state.distance(),
        state.distance() / geometry.radius
    );
    println!("Bearing:  {:.2}°", state.bearing());
    println!("Pitch:    {:.2}°", state.pitch());
    println!("Aspect:   {:.3}", state.aspect());
    println!();

    println!("Visible polygon ({} vertices)", polygon.vertices.len());
    if let Some(pole) = polygon.pole {
        println!("  Routed through the {:?} pole", pole);
    }
    for v in &polygon.vertices {
        println!("  {:>11.6}, {:>10.6}", v.lng, v.lat);
    }
    println!();

    println!("Bounding box: {}", bbox);
    println!("Tile box ({}): {}", scheme.name(), tile_box);
    println!("  {} x {} = {} tiles", tile_box.width(), tile_box.height(), tile_box.tile_count());

    Ok(())
}
