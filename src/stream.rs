//! Live pen sample printing

use std::future::Future;
use std::io::{self, Write};

use chrono::{DateTime, Local};
use stu540::pen::PenSample;
use stu540::types::DeviceConfig;
use stu540::Stu540;
use stu_sync_core::HidBackend;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_stream::StreamExt;
use tracing::debug;

/// A pen sample with its arrival time
#[derive(Clone, Copy, Debug)]
pub struct Stamped {
    pub at: DateTime<Local>,
    pub sample: PenSample,
}

impl Stamped {
    fn write_line(&self, out: &mut impl Write, config: Option<&DeviceConfig>) -> io::Result<()> {
        let PenSample {
            x,
            y,
            pressure,
            is_pen_down,
        } = self.sample;
        write!(
            out,
            "{} x={x} y={y} pressure={pressure} {}",
            self.at.format("%H:%M:%S%.3f"),
            if is_pen_down { "down" } else { "up" },
        )?;
        if let Some((cx, cy)) = config.and_then(|c| self.sample.to_canvas(c)) {
            write!(out, " canvas=({cx:.1}, {cy:.1})")?;
        }
        writeln!(out)
    }
}

/// Print pen samples from a connected tablet until `shutdown` resolves.
/// Returns the number of samples written.
pub async fn print_samples<B: HidBackend>(
    tablet: &Stu540<B>,
    shutdown: impl Future<Output = ()>,
    out: &mut impl Write,
) -> io::Result<usize> {
    let config = tablet.info().await;
    let (tx, rx) = mpsc::unbounded_channel();
    let id = tablet.on_pen_sample(move |sample| {
        let _ = tx.send(Stamped {
            at: Local::now(),
            sample: *sample,
        });
    });
    let mut samples = UnboundedReceiverStream::new(rx);

    tokio::pin!(shutdown);
    let mut count = 0;
    let result = loop {
        tokio::select! {
            biased;
            Some(stamped) = samples.next() => {
                if let Err(e) = stamped.write_line(out, config.as_ref()) {
                    break Err(e);
                }
                count += 1;
            },
            _ = &mut shutdown => break Ok(count),
        }
    };

    tablet.remove_pen_listener(id);
    debug!(count, "stopped pen stream");
    result
}
