//! Plain-text mesh listing for visualization and debugging.
//!
//! The format is line oriented: a `# section count` header followed by one
//! whitespace-separated row per entry. It is meant for eyeballing and quick
//! scripts, not for reloading.

use std::io::{self, Write};

use vort_math::Segment3;

use crate::connectivity::{Connectivity, PrimaryRef};
use crate::fields::FieldStore;
use crate::polygons::FacePolygons;
use crate::snapshot::{MeshSnapshot, PointKind};

/// Write the snapshot and whatever derived structures are supplied.
pub fn write_mesh<W: Write>(
    w: &mut W,
    snapshot: &MeshSnapshot,
    fields: Option<&FieldStore>,
    conn: Option<&Connectivity>,
    polygons: Option<&FacePolygons>,
) -> io::Result<()> {
    writeln!(
        w,
        "# snapshot {} task {}/{} extent {} {} {} {} {} {}",
        snapshot.version,
        snapshot.task,
        snapshot.num_tasks,
        snapshot.extent.min.x,
        snapshot.extent.min.y,
        snapshot.extent.min.z,
        snapshot.extent.max.x,
        snapshot.extent.max.y,
        snapshot.extent.max.z
    )?;

    writeln!(w, "# points {} primary {}", snapshot.num_points(), snapshot.num_primary)?;
    for (i, p) in snapshot.points.iter().enumerate() {
        let kind = match p.kind {
            PointKind::Primary => "primary",
            PointKind::Ghost => "ghost",
        };
        writeln!(
            w,
            "{i} {} {} {} {kind} {:.10} {:.10} {:.10}",
            p.id, p.task, p.cell, p.position.x, p.position.y, p.position.z
        )?;
    }

    if let Some(fields) = fields {
        writeln!(w, "# cells {}", fields.len())?;
        for (i, c) in fields.cells().iter().enumerate() {
            writeln!(
                w,
                "{i} {:.6e} {:.6e} {:.6e} {:.6e} {:.6e} {:.6e} {:.6e}",
                c.density,
                c.utherm,
                c.pressure,
                c.energy,
                c.center.x,
                c.center.y,
                c.center.z
            )?;
        }
    }

    writeln!(w, "# tetras {}", snapshot.num_tetras())?;
    for (i, (t, cc)) in snapshot.tetras.iter().zip(&snapshot.circumcenters).enumerate() {
        let v: Vec<String> = t.p.iter().map(|p| fmt_index(*p)).collect();
        let n: Vec<String> = t.t.iter().map(|t| fmt_index(*t)).collect();
        writeln!(
            w,
            "{i} {} {} {} {:.10} {:.10} {:.10}",
            v.join(" "),
            n.join(" "),
            u8::from(t.deleted),
            cc.x,
            cc.y,
            cc.z
        )?;
    }

    writeln!(w, "# faces {}", snapshot.faces.len())?;
    for (i, f) in snapshot.faces.iter().enumerate() {
        writeln!(
            w,
            "{i} {} {} {:.6e} {:.10} {:.10} {:.10}",
            f.p1, f.p2, f.area, f.centroid.x, f.centroid.y, f.centroid.z
        )?;
    }

    if let Some(conn) = conn {
        writeln!(w, "# primary_of {}", conn.num_points())?;
        for dp in 0..conn.num_points() {
            match conn.primary_of(dp) {
                Some(PrimaryRef::Local(q)) => writeln!(w, "{dp} local {q}")?,
                Some(PrimaryRef::Remote { task, cell }) => {
                    writeln!(w, "{dp} remote {task} {cell}")?
                }
                None => writeln!(w, "{dp} -")?,
            }
        }

        writeln!(w, "# connectivity {} edges {}", conn.num_points(), conn.num_edges())?;
        for dp in 0..conn.num_points() {
            if let Some(r) = conn.range(dp) {
                writeln!(w, "{dp} {} {}", r.offset, r.count)?;
            }
        }
        for (i, e) in conn.edges().iter().enumerate() {
            writeln!(
                w,
                "{i} {} {:.10} {:.10} {:.10}",
                e.opposite, e.midpoint.x, e.midpoint.y, e.midpoint.z
            )?;
        }
    }

    if let Some(polys) = polygons {
        writeln!(w, "# polygons {} vertices {}", polys.len(), polys.num_vertices())?;
        for face in 0..polys.len() {
            let ring: Vec<String> = polys.ring(face).iter().map(|t| t.to_string()).collect();
            if let Some(r) = polys.range(face) {
                writeln!(w, "{face} {} {} {}", r.offset, r.count, ring.join(" "))?;
            }
        }
    }

    Ok(())
}

/// Write Delaunay and Voronoi wireframes as segment lists.
///
/// Rows are `owner ax ay az bx by bz length`, where the owner is the tetra
/// or face index. Tetras touching infinity and Voronoi segments leaving the
/// extent are skipped.
pub fn write_wireframe<W: Write>(
    w: &mut W,
    snapshot: &MeshSnapshot,
    polygons: Option<&FacePolygons>,
) -> io::Result<()> {
    let tetra_edges: Vec<(usize, Segment3)> = (0..snapshot.num_tetras())
        .filter_map(|t| snapshot.tetra_edges(t).map(|edges| (t, edges)))
        .flat_map(|(t, edges)| edges.into_iter().map(move |s| (t, s)))
        .collect();
    writeln!(w, "# tetra_edges {}", tetra_edges.len())?;
    for (t, s) in &tetra_edges {
        write_segment(w, *t, s)?;
    }

    if let Some(polys) = polygons {
        let voronoi_edges: Vec<(usize, Segment3)> = (0..polys.len())
            .filter_map(|f| polys.voronoi_edges(f, snapshot).map(|edges| (f, edges)))
            .flat_map(|(f, edges)| edges.into_iter().map(move |s| (f, s)))
            .collect();
        writeln!(w, "# voronoi_edges {}", voronoi_edges.len())?;
        for (f, s) in &voronoi_edges {
            write_segment(w, *f, s)?;
        }
    }

    Ok(())
}

fn write_segment<W: Write>(w: &mut W, owner: usize, s: &Segment3) -> io::Result<()> {
    writeln!(
        w,
        "{owner} {:.10} {:.10} {:.10} {:.10} {:.10} {:.10} {:.10}",
        s.a.x,
        s.a.y,
        s.a.z,
        s.b.x,
        s.b.y,
        s.b.z,
        s.length()
    )
}

fn fmt_index(i: Option<usize>) -> String {
    i.map_or_else(|| "-1".to_string(), |v| v.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit;

    #[test]
    fn test_dump_sections() {
        let snap = testkit::lattice(2, 1.0);
        let fields = testkit::uniform_fields(&snap, 1.0);
        let conn = Connectivity::build(&snap).unwrap();
        let mut out = Vec::new();
        write_mesh(&mut out, &snap, Some(&fields), Some(&conn), None).unwrap();
        let text = String::from_utf8(out).unwrap();

        assert!(text.contains("# points 8 primary 8"));
        assert!(text.contains("# cells 8"));
        assert!(text.contains("# connectivity 8 edges 24"));
        assert!(text.contains("0 local 0"));
        assert!(!text.contains("# polygons"));
    }

    #[test]
    fn test_dump_polygons_and_infinity() {
        let mut snap = testkit::edge_ring(4);
        snap.tetras[0].p[3] = None;
        let mut out = Vec::new();
        let polys = FacePolygons::default();
        write_mesh(&mut out, &snap, None, None, Some(&polys)).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("# tetras 4"));
        assert!(text.lines().any(|l| l.starts_with("0 0 1 2 -1 ")));
        assert!(text.contains("# polygons 0 vertices 0"));
    }

    #[test]
    fn test_wireframe_tetra_edges() {
        let mut snap = testkit::edge_ring(4);
        snap.tetras[0].p[3] = None;
        let mut out = Vec::new();
        write_wireframe(&mut out, &snap, None).unwrap();
        let text = String::from_utf8(out).unwrap();

        // Three finite tetras, six edges each.
        assert!(text.starts_with("# tetra_edges 18\n"));
        assert_eq!(text.lines().filter(|l| l.starts_with("1 ")).count(), 6);
        assert!(!text.lines().any(|l| l.starts_with("0 ")));
        assert!(!text.contains("# voronoi_edges"));
        // Apex to apex along the axis has length 2.
        assert!(text.lines().any(|l| l.starts_with("1 ") && l.ends_with(" 2.0000000000")));
    }

    #[test]
    fn test_wireframe_voronoi_edges() {
        let snap = testkit::edge_ring(5);
        let polys = FacePolygons::build(&snap).unwrap();
        let mut out = Vec::new();
        write_wireframe(&mut out, &snap, Some(&polys)).unwrap();
        let text = String::from_utf8(out).unwrap();

        let section: Vec<&str> = text
            .lines()
            .skip_while(|l| !l.starts_with("# voronoi_edges"))
            .collect();
        assert!(!section.is_empty());
        // The axis face is a closed pentagon.
        let face0: Vec<&str> = section[1..].iter().copied().filter(|l| l.starts_with("0 ")).collect();
        assert_eq!(face0.len(), 5);
        let n: usize = section[0].rsplit(' ').next().unwrap().parse().unwrap();
        assert_eq!(n, section.len() - 1);
    }
}
