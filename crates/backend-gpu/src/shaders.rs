//! WGSL sources generated from kernel profiles.

use sparseforge_kernels::{GemmLayout, GemmProfile};
use std::fmt::Write;

fn vector_type(width: usize) -> String {
    match width {
        1 => "f32".to_string(),
        w => format!("vec{w}<f32>"),
    }
}

/// Workgroup count for a `size_m × size_n` output under `profile`.
pub fn gemm_dispatch_dims(profile: &GemmProfile, size_m: usize, size_n: usize) -> (u32, u32) {
    let x = size_n.div_ceil(profile.nl.max(1)).max(1);
    let y = size_m.div_ceil(profile.ml.max(1)).max(1);
    (x as u32, y as u32)
}

/// Tiled single-precision product for `layout`. The output is row-major
/// `size_m × size_n`; operands are row-major in their stored shape.
///
/// Every barrier sits in uniform control flow: staging loops have constant
/// bounds and guard the store, and out-of-range loads yield zero.
pub fn gemm_shader_source(profile: &GemmProfile, layout: GemmLayout) -> String {
    let GemmProfile {
        ml,
        kl,
        nl,
        ms,
        ks,
        ns,
        lhs_local,
        rhs_local,
        vector,
        unroll,
    } = *profile;
    let (wg_x, wg_y) = profile.work_group_dims();
    let wg_size = wg_x * wg_y;
    let lanes = ns / vector;
    let acc_type = vector_type(vector);

    let lhs_index = if layout.lhs_transposed() {
        "kk * params.size_m + row"
    } else {
        "row * params.size_k + kk"
    };
    let rhs_index = if layout.rhs_transposed() {
        "col * params.size_k + kk"
    } else {
        "kk * params.size_n + col"
    };

    let mut tiles = String::new();
    let mut staging = String::new();
    if lhs_local {
        let _ = writeln!(tiles, "var<workgroup> lhs_tile: array<f32, {}>;", ml * kl);
        let _ = write!(
            staging,
            r#"
    for (var base: u32 = 0u; base < {len}u; base = base + {wg_size}u) {{
      let s = base + lindex;
      if (s < {len}u) {{
        lhs_tile[s] = lhs_at(tile_row + s / {kl}u, k0 + s % {kl}u);
      }}
    }}"#,
            len = ml * kl,
        );
    }
    if rhs_local {
        let _ = writeln!(tiles, "var<workgroup> rhs_tile: array<f32, {}>;", kl * nl);
        let _ = write!(
            staging,
            r#"
    for (var base: u32 = 0u; base < {len}u; base = base + {wg_size}u) {{
      let s = base + lindex;
      if (s < {len}u) {{
        rhs_tile[s] = rhs_at(k0 + s / {nl}u, tile_col + s % {nl}u);
      }}
    }}"#,
            len = kl * nl,
        );
    }
    let barrier = if lhs_local || rhs_local {
        "\n    workgroupBarrier();"
    } else {
        ""
    };

    let lhs_load = |row: &str| {
        if lhs_local {
            format!("lhs_tile[({row}) * {kl}u + k]")
        } else {
            format!("lhs_at(tile_row + {row}, k0 + k)")
        }
    };
    let rhs_load = |col: String| {
        if rhs_local {
            format!("rhs_tile[k * {nl}u + {col}]")
        } else {
            format!("rhs_at(k0 + k, tile_col + {col})")
        }
    };
    let b_expr = if vector == 1 {
        rhs_load(format!("lid.x * {ns}u + j"))
    } else {
        let parts: Vec<String> = (0..vector)
            .map(|lane| rhs_load(format!("lid.x * {ns}u + j * {vector}u + {lane}u")))
            .collect();
        format!("{acc_type}({})", parts.join(", "))
    };
    let a_expr = lhs_load(&format!("lid.y * {ms}u + i"));

    let mut body = String::new();
    for u in 0..unroll {
        let step = format!(
            r#"
          let k = kk + ki + {u}u;
          for (var i: u32 = 0u; i < {ms}u; i = i + 1u) {{
            let a = {a_expr};
            for (var j: u32 = 0u; j < {lanes}u; j = j + 1u) {{
              let b = {b_expr};
              acc[i * {lanes}u + j] = acc[i * {lanes}u + j] + a * b;
            }}
          }}"#
        );
        if u == 0 {
            body.push_str(&step);
        } else {
            let _ = write!(body, "\n          if (ki + {u}u < {ks}u) {{{step}\n          }}");
        }
    }

    let mut stores = String::new();
    for lane in 0..vector {
        let value = if vector == 1 {
            "v".to_string()
        } else {
            format!("v[{lane}]")
        };
        let _ = write!(
            stores,
            "\n      store(row, col0 + j * {vector}u + {lane}u, {value});"
        );
    }

    format!(
        r#"
struct Params {{
  size_m: u32,
  size_n: u32,
  size_k: u32,
  _padding: u32,
}}

@group(0) @binding(0)
var<storage, read> lhs: array<f32>;

@group(0) @binding(1)
var<storage, read> rhs: array<f32>;

@group(0) @binding(2)
var<storage, read_write> output: array<f32>;

@group(0) @binding(3)
var<uniform> params: Params;

{tiles}
fn lhs_at(row: u32, kk: u32) -> f32 {{
  var value: f32 = 0.0;
  if (row < params.size_m && kk < params.size_k) {{
    value = lhs[{lhs_index}];
  }}
  return value;
}}

fn rhs_at(kk: u32, col: u32) -> f32 {{
  var value: f32 = 0.0;
  if (kk < params.size_k && col < params.size_n) {{
    value = rhs[{rhs_index}];
  }}
  return value;
}}

fn store(row: u32, col: u32, value: f32) {{
  if (row < params.size_m && col < params.size_n) {{
    output[row * params.size_n + col] = value;
  }}
}}

@compute @workgroup_size({wg_x}, {wg_y}, 1)
fn main(
  @builtin(workgroup_id) wid: vec3<u32>,
  @builtin(local_invocation_id) lid: vec3<u32>,
  @builtin(local_invocation_index) lindex: u32,
) {{
  let tile_row = wid.y * {ml}u;
  let tile_col = wid.x * {nl}u;
  let row0 = tile_row + lid.y * {ms}u;
  let col0 = tile_col + lid.x * {ns}u;
  var acc: array<{acc_type}, {acc_len}>;

  for (var k0: u32 = 0u; k0 < params.size_k; k0 = k0 + {kl}u) {{{staging}{barrier}
    for (var kk: u32 = 0u; kk < {kl}u; kk = kk + {ks}u) {{
      for (var ki: u32 = 0u; ki < {ks}u; ki = ki + {unroll}u) {{{body}
      }}
    }}{barrier}
  }}

  for (var i: u32 = 0u; i < {ms}u; i = i + 1u) {{
    let row = row0 + i;
    for (var j: u32 = 0u; j < {lanes}u; j = j + 1u) {{
      let v = acc[i * {lanes}u + j];{stores}
    }}
  }}
}}
"#,
        acc_len = ms * lanes,
    )
}

/// One invocation per row, grid-strided over the rows of a scalar CSR matrix.
pub fn csr_spmv_shader_source(work_group_size: u32) -> String {
    format!(
        r#"
struct Params {{
  rows: u32,
  _pad0: u32,
  _pad1: u32,
  _pad2: u32,
}}

@group(0) @binding(0)
var<storage, read> row_ptr: array<u32>;
@group(0) @binding(1)
var<storage, read> col_idx: array<u32>;
@group(0) @binding(2)
var<storage, read> values: array<f32>;
@group(0) @binding(3)
var<storage, read> x: array<f32>;
@group(0) @binding(4)
var<storage, read_write> result: array<f32>;
@group(0) @binding(5)
var<uniform> params: Params;

@compute @workgroup_size({work_group_size}, 1, 1)
fn main(
  @builtin(global_invocation_id) gid: vec3<u32>,
  @builtin(num_workgroups) groups: vec3<u32>,
) {{
  let stride = groups.x * {work_group_size}u;
  for (var row: u32 = gid.x; row < params.rows; row = row + stride) {{
    var sum: f32 = 0.0;
    for (var j: u32 = row_ptr[row]; j < row_ptr[row + 1u]; j = j + 1u) {{
      sum = sum + values[j] * x[col_idx[j]];
    }}
    result[row] = sum;
  }}
}}
"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn workgroup_shape_follows_profile() {
        let profile = GemmProfile::default();
        let source = gemm_shader_source(&profile, GemmLayout::AA);
        assert!(source.contains("@workgroup_size(16, 16, 1)"));
        assert!(source.contains("var<workgroup> lhs_tile: array<f32, 2048>;"));
        assert!(!source.contains("rhs_tile"));
        assert!(source.contains("workgroupBarrier();"));
        assert!(source.contains("var acc: array<f32, 16>;"));
    }

    #[test]
    fn unstaged_profile_has_no_barrier() {
        let profile = GemmProfile {
            lhs_local: false,
            ..GemmProfile::default()
        };
        let source = gemm_shader_source(&profile, GemmLayout::AA);
        assert!(!source.contains("var<workgroup>"));
        assert!(!source.contains("workgroupBarrier"));
        assert!(source.contains("lhs_at(tile_row + lid.y * 4u + i, k0 + k)"));
    }

    #[test]
    fn transposed_operands_swap_indexing() {
        let profile = GemmProfile::default();
        let plain = gemm_shader_source(&profile, GemmLayout::AA);
        assert!(plain.contains("lhs[row * params.size_k + kk]"));
        assert!(plain.contains("rhs[kk * params.size_n + col]"));
        let both = gemm_shader_source(&profile, GemmLayout::TT);
        assert!(both.contains("lhs[kk * params.size_m + row]"));
        assert!(both.contains("rhs[col * params.size_k + kk]"));
    }

    #[test]
    fn vector_width_changes_accumulators_and_stores() {
        let profile = GemmProfile {
            vector: 4,
            rhs_local: true,
            ..GemmProfile::default()
        };
        let source = gemm_shader_source(&profile, GemmLayout::AT);
        assert!(source.contains("var acc: array<vec4<f32>, 4>;"));
        assert!(source.contains("v[3]"));
        assert!(source.contains("var<workgroup> rhs_tile: array<f32, 2048>;"));
    }

    #[test]
    fn unrolled_copies_are_guarded() {
        let profile = GemmProfile {
            unroll: 2,
            ..GemmProfile::default()
        };
        let source = gemm_shader_source(&profile, GemmLayout::AA);
        assert!(source.contains("ki = ki + 2u"));
        assert!(source.contains("if (ki + 1u < 4u)"));
    }

    #[test]
    fn dispatch_covers_ragged_edges() {
        let profile = GemmProfile::default();
        assert_eq!(gemm_dispatch_dims(&profile, 65, 64), (1, 2));
        assert_eq!(gemm_dispatch_dims(&profile, 0, 0), (1, 1));
    }

    #[test]
    fn spmv_source_is_grid_strided() {
        let source = csr_spmv_shader_source(128);
        assert!(source.contains("@workgroup_size(128, 1, 1)"));
        assert!(source.contains("groups.x * 128u"));
    }
}
