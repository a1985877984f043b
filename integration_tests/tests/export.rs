mod common;

use anyhow::Result;
use bevy::math::UVec2;
use core_bake::{bake, export, BakeInputs, RasterGrid, SeedSource};
use graph_schema::{decode_graph, decode_graph_json, OWNER_FIELD};

fn baked() -> Result<core_bake::BakedWorld> {
    let config = common::test_config();
    let grid = RasterGrid::new(20, 10);
    let inputs = BakeInputs::uniform(
        grid,
        SeedSource::Mask(common::seed_mask(grid, &[(3, 4), (12, 2), (15, 7)])),
    )
    .with_primary_rivers(common::column_mask(grid, 8), vec![UVec2::new(8, 9)]);
    Ok(bake(&inputs, &config)?)
}

#[test]
fn binary_export_decodes_to_the_same_records() -> Result<()> {
    let baked = baked()?;
    let bytes = export::encode(&baked)?;
    let decoded = decode_graph(&bytes)?;

    assert_eq!(decoded, export::to_schema(&baked));
    assert_eq!(decoded.header.width, 20);
    assert_eq!(decoded.header.field_count, 3);
    assert_eq!(decoded.header.node_count as usize, decoded.nodes.len());
    Ok(())
}

#[test]
fn json_export_keeps_field_nodes_addressable() -> Result<()> {
    let baked = baked()?;
    let json = export::encode_json(&baked)?;
    let decoded = decode_graph_json(&json)?;

    for (field, &node) in decoded.field_nodes.iter().enumerate() {
        let node = node as usize;
        assert_eq!(decoded.nodes.owner_kind[node], OWNER_FIELD);
        assert_eq!(decoded.nodes.owner_index[node] as usize, field);
    }
    Ok(())
}
