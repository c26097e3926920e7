//! Built-in headless renderers.
//!
//! `TableRenderer` produces a text table with full legend and selection
//! support; `SparklineRenderer` is the minimal capability profile (no
//! legend, no selection, fixed density).

use super::{RenderContext, RenderError, RenderedFrame, Renderer};
use crate::data::DataPayload;

/// Renders the payload as rows of `timestamp | v1 v2 ...` text.
#[derive(Debug, Default)]
pub struct TableRenderer;

impl TableRenderer {
    fn render_lines(ctx: &RenderContext, data: &DataPayload) -> Vec<String> {
        let mut lines = Vec::with_capacity(data.rows.len() + 1);
        lines.push(format!(
            "{} [{} .. {}] {}",
            ctx.title, ctx.view_after_ms, ctx.view_before_ms, ctx.units
        ));
        for row in &data.rows {
            let cells: Vec<String> = row
                .values
                .iter()
                .map(|v| match v {
                    Some(v) => format!("{:.2}", v),
                    None => "-".to_string(),
                })
                .collect();
            lines.push(format!("{} | {}", row.timestamp_ms, cells.join(" ")));
        }
        lines
    }
}

impl Renderer for TableRenderer {
    fn name(&self) -> &str {
        "table"
    }

    fn create(&self, ctx: &RenderContext, data: &DataPayload) -> Result<RenderedFrame, RenderError> {
        Ok(RenderedFrame {
            library: self.name().to_string(),
            lines: Self::render_lines(ctx, data),
            selection_ms: None,
            width_px: ctx.width_px,
            height_px: ctx.height_px,
            revision: 1,
        })
    }

    fn update(
        &self,
        frame: &mut RenderedFrame,
        ctx: &RenderContext,
        data: &DataPayload,
    ) -> Result<(), RenderError> {
        frame.lines = Self::render_lines(ctx, data);
        frame.revision += 1;
        Ok(())
    }

    fn supports_selection(&self) -> bool {
        true
    }

    fn set_selection(&self, frame: &mut RenderedFrame, timestamp_ms: i64) {
        frame.selection_ms = Some(timestamp_ms);
    }

    fn clear_selection(&self, frame: &mut RenderedFrame) {
        frame.selection_ms = None;
    }
}

/// One-line unicode sparkline. No legend, no selection, pans and zooms.
#[derive(Debug, Default)]
pub struct SparklineRenderer;

const SPARK_CHARS: [char; 8] = ['▁', '▂', '▃', '▄', '▅', '▆', '▇', '█'];

impl SparklineRenderer {
    fn sparkline(data: &DataPayload) -> String {
        let (lo, hi) = match data.value_range() {
            Some(range) => range,
            None => return String::new(),
        };
        let span = (hi - lo).max(f64::EPSILON);
        data.rows
            .iter()
            .map(|row| {
                // First dimension only; sparklines are single-series.
                match row.values.first().copied().flatten() {
                    Some(v) => {
                        let idx = (((v - lo) / span) * (SPARK_CHARS.len() - 1) as f64).round();
                        SPARK_CHARS[idx as usize]
                    }
                    None => ' ',
                }
            })
            .collect()
    }
}

impl Renderer for SparklineRenderer {
    fn name(&self) -> &str {
        "sparkline"
    }

    fn create(&self, ctx: &RenderContext, data: &DataPayload) -> Result<RenderedFrame, RenderError> {
        Ok(RenderedFrame {
            library: self.name().to_string(),
            lines: vec![Self::sparkline(data)],
            selection_ms: None,
            width_px: ctx.width_px,
            height_px: ctx.height_px,
            revision: 1,
        })
    }

    fn update(
        &self,
        frame: &mut RenderedFrame,
        _ctx: &RenderContext,
        data: &DataPayload,
    ) -> Result<(), RenderError> {
        frame.lines = vec![Self::sparkline(data)];
        frame.revision += 1;
        Ok(())
    }

    fn supports_legend(&self) -> bool {
        false
    }

    fn autoresize(&self) -> bool {
        true
    }

    fn pixels_per_point(&self) -> u32 {
        8
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::DataRow;

    fn ctx() -> RenderContext {
        RenderContext {
            chart_id: "system.cpu".into(),
            title: "cpu".into(),
            units: "%".into(),
            view_after_ms: 1_000,
            view_before_ms: 3_000,
            width_px: 600,
            height_px: 200,
        }
    }

    fn payload() -> DataPayload {
        DataPayload {
            after_ms: 1_000,
            before_ms: 3_000,
            update_every_ms: 1_000,
            labels: vec!["user".into()],
            rows: vec![
                DataRow { timestamp_ms: 1_000, values: vec![Some(0.0)] },
                DataRow { timestamp_ms: 2_000, values: vec![None] },
                DataRow { timestamp_ms: 3_000, values: vec![Some(10.0)] },
            ],
        }
    }

    #[test]
    fn test_table_create_then_update_bumps_revision() {
        let renderer = TableRenderer;
        let mut frame = renderer.create(&ctx(), &payload()).unwrap();
        assert_eq!(frame.revision, 1);
        assert_eq!(frame.lines.len(), 4);
        renderer.update(&mut frame, &ctx(), &payload()).unwrap();
        assert_eq!(frame.revision, 2);
    }

    #[test]
    fn test_table_selection_roundtrip() {
        let renderer = TableRenderer;
        let mut frame = renderer.create(&ctx(), &payload()).unwrap();
        renderer.set_selection(&mut frame, 2_000);
        assert_eq!(frame.selection_ms, Some(2_000));
        renderer.clear_selection(&mut frame);
        assert_eq!(frame.selection_ms, None);
    }

    #[test]
    fn test_sparkline_scales_and_gaps() {
        let renderer = SparklineRenderer;
        let frame = renderer.create(&ctx(), &payload()).unwrap();
        let line: Vec<char> = frame.lines[0].chars().collect();
        assert_eq!(line.len(), 3);
        assert_eq!(line[0], '▁');
        assert_eq!(line[1], ' ');
        assert_eq!(line[2], '█');
        assert!(!renderer.supports_selection());
        assert!(!renderer.supports_legend());
    }
}
