//! Fixed-width table rendering for terminal output.

/// Render `rows` under `header` with columns padded to their widest cell.
pub fn render(header: &[String], rows: &[Vec<String>]) -> String {
    let columns = header.len();
    let mut widths: Vec<usize> = header.iter().map(|h| h.len()).collect();
    for row in rows {
        for (i, cell) in row.iter().enumerate().take(columns) {
            widths[i] = widths[i].max(cell.len());
        }
    }

    let render_row = |cells: &[String]| -> String {
        cells
            .iter()
            .enumerate()
            .take(columns)
            .map(|(i, cell)| format!("{cell:>width$}", width = widths[i]))
            .collect::<Vec<_>>()
            .join("  ")
    };

    let separator: String = widths
        .iter()
        .map(|w| "-".repeat(*w))
        .collect::<Vec<_>>()
        .join("  ");

    let mut out = Vec::with_capacity(rows.len() + 2);
    out.push(render_row(header));
    out.push(separator);
    for row in rows {
        out.push(render_row(row));
    }
    out.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(cells: &[&str]) -> Vec<String> {
        cells.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn columns_align_to_the_widest_cell() {
        let rendered = render(
            &strings(&["#", "out"]),
            &[strings(&["mic", "0.50"]), strings(&["pc", "1.00"])],
        );
        let lines: Vec<&str> = rendered.lines().collect();
        assert_eq!(lines[0], "  #   out");
        assert_eq!(lines[1], "---  ----");
        assert_eq!(lines[2], "mic  0.50");
        assert_eq!(lines[3], " pc  1.00");
    }

    #[test]
    fn extra_cells_beyond_the_header_are_ignored() {
        let rendered = render(&strings(&["a"]), &[strings(&["1", "spill"])]);
        assert!(!rendered.contains("spill"));
    }
}
