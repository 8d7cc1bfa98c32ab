use std::fmt::Write as _;

/// Renders an aligned text table. Numeric-looking cells are right-aligned.
pub fn render_table(headers: &[String], rows: &[Vec<String>]) -> String {
    let mut widths = headers.iter().map(|h| h.chars().count()).collect::<Vec<_>>();
    for row in rows {
        for (idx, cell) in row.iter().enumerate().take(widths.len()) {
            widths[idx] = widths[idx].max(sanitize(cell).chars().count());
        }
    }
    let numeric = (0..widths.len())
        .map(|idx| {
            !rows.is_empty()
                && rows
                    .iter()
                    .filter_map(|row| row.get(idx))
                    .all(|cell| cell.is_empty() || looks_numeric(cell))
        })
        .collect::<Vec<_>>();

    let mut output = String::new();
    let _ = writeln!(output, "{}", format_row(headers, &widths, &numeric));
    let separator = widths.iter().map(|w| "-".repeat(*w)).collect::<Vec<_>>();
    let _ = writeln!(output, "{}", format_row(&separator, &widths, &numeric));
    for row in rows {
        let _ = writeln!(output, "{}", format_row(row, &widths, &numeric));
    }
    output
}

pub fn print_table(headers: &[String], rows: &[Vec<String>]) {
    print!("{}", render_table(headers, rows));
}

fn format_row(values: &[String], widths: &[usize], right_align: &[bool]) -> String {
    let cells = widths
        .iter()
        .enumerate()
        .map(|(idx, width)| {
            let value = values.get(idx).map(|v| sanitize(v)).unwrap_or_default();
            if right_align[idx] {
                format!("{value:>width$}")
            } else {
                format!("{value:<width$}")
            }
        })
        .collect::<Vec<_>>();
    cells.join("  ").trim_end().to_string()
}

fn looks_numeric(value: &str) -> bool {
    let trimmed = value.trim_end_matches('%');
    !trimmed.is_empty() && trimmed.parse::<f64>().is_ok()
}

fn sanitize(value: &str) -> String {
    value.replace(['\n', '\r', '\t'], " ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn aligns_text_left_and_numbers_right() {
        let rendered = render_table(
            &strings(&["store", "net"]),
            &[strings(&["North", "5.00"]), strings(&["Southgate", "120.50"])],
        );
        let lines: Vec<&str> = rendered.lines().collect();
        assert_eq!(lines[0], "store         net");
        assert_eq!(lines[1], "---------  ------");
        assert_eq!(lines[2], "North        5.00");
        assert_eq!(lines[3], "Southgate  120.50");
    }

    #[test]
    fn flattens_control_characters() {
        let rendered = render_table(&strings(&["a"]), &[strings(&["x\ny"])]);
        assert!(rendered.contains("x y"));
    }
}
