//! Human-readable memory dump: one line per entry, pipe-delimited fields.
//!
//! A debugging aid, not a wire contract — the only promise is that a human
//! can re-parse it. Allocated ranges are dumped in full; the Main Memory is
//! dumped sparsely (nonzero cells only) since it is by far the largest.

use std::io::{self, Write};

use crate::bits;
use crate::core::Core;
use crate::error::MapError;

fn unpack_line(word: u64, widths: &[u32]) -> io::Result<Vec<u64>> {
    bits::unpack(word, widths)
        .map(|(fields, _)| fields)
        .map_err(|e: MapError| io::Error::other(e.to_string()))
}

/// Write the dump of every memory's programmed contents.
///
/// # Errors
///
/// Returns any I/O error from `out`.
pub fn write_dump<W: Write>(core: &Core, out: &mut W) -> io::Result<()> {
    let g = *core.geometry();

    writeln!(out, "# PAT  entry|am_addr|mm_col|mm_row_hi")?;
    for (i, &word) in core.pat.words().iter().enumerate().take(core.nrn_alloc.used()) {
        let f = unpack_line(word, &[g.am_addr_bits, g.mm_x_bits, g.mm_y_bits - g.pool_bits])?;
        writeln!(out, "{i}|{}|{}|{}", f[0], f[1], f[2])?;
    }

    writeln!(out, "# AM   entry|value|thr_idx|stop|next_addr")?;
    for (i, &word) in core.am.words().iter().enumerate().take(core.am_alloc.used()) {
        let f = unpack_line(word, &[g.am_val_bits, g.thr_bits, 1, g.global_tag_bits()])?;
        writeln!(out, "{i}|{}|{}|{}|{}", f[0], f[1], f[2], f[3])?;
    }

    writeln!(out, "# MM   row|col|weight")?;
    for (i, &word) in core.mm.words().iter().enumerate() {
        if word != 0 {
            let value = bits::from_ones_complement(word, g.weight_bits);
            writeln!(out, "{}|{}|{value}", i / g.mm_width(), i % g.mm_width())?;
        }
    }

    for (name, mem, used) in [
        ("TAT0", &core.tat0, core.tat0_alloc.used()),
        ("TAT1", &core.tat1, core.tat1_alloc.used()),
    ] {
        writeln!(out, "# {name} entry|stop|type|payload")?;
        for (i, &word) in mem.words().iter().enumerate().take(used) {
            let f = unpack_line(word, &[1, 2])?;
            let payload = word >> 3;
            writeln!(out, "{i}|{}|{}|{payload:#x}", f[0], f[1])?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use kestrel_chip::ChipGeometry;

    #[test]
    fn empty_core_dumps_headers_only() {
        let core = Core::new(ChipGeometry::K1);
        let mut buf = Vec::new();
        write_dump(&core, &mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines.len(), 5, "one header per dumped memory");
        assert!(lines.iter().all(|l| l.starts_with('#')));
    }
}
