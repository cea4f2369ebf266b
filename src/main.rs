use std::error::Error;
use std::io::{stdout, Write};
use std::path::PathBuf;
use std::time::Duration;

use bpaf::Bpaf;
use stu540::types::{Options, Outcome, Rgb};
use stu540::upload::chunk_count;
use stu540::Stu540;
use stu_sync_core::HidBackend;
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::hid::HidapiBackend;
use crate::lock::Lock;
use crate::media::encode_bgr24;

mod config;
mod hid;
mod lock;
mod media;
mod stream;

#[derive(Clone, Debug, Bpaf)]
enum Command {
    /// Check whether a supported tablet is attached, without opening it
    #[bpaf(command)]
    Available,
    /// Connect and print the tablet properties
    #[bpaf(command)]
    Info,
    /// Clear the tablet screen
    #[bpaf(command)]
    Clear,
    /// Set the pen ink color and stroke width
    #[bpaf(command)]
    Pen {
        /// Ink color (hex: #RRGGBB or #RGB), defaults to the configured color
        #[bpaf(short, long, argument("COLOR"))]
        color: Option<Rgb>,
        /// Stroke width, defaults to the configured width
        #[bpaf(short, long, argument("WIDTH"))]
        width: Option<u8>,
    },
    /// Set the screen background color
    #[bpaf(command)]
    Background {
        /// Background color (hex: #RRGGBB or #RGB), defaults to the configured color
        #[bpaf(short, long, argument("COLOR"))]
        color: Option<Rgb>,
    },
    /// Upload an image to the screen
    #[bpaf(command, fallback_to_usage)]
    Image {
        /// Use nearest neighbor interpolation when resizing, otherwise uses gaussian
        #[bpaf(short('n'), long("nearest"))]
        nearest: bool,
        /// Background color for transparent images
        #[bpaf(short, long, argument("COLOR"))]
        bg: Option<Rgb>,
        /// Path to image to re-encode and upload
        #[bpaf(positional("PATH"), guard(|p| p.exists(), "file not found"))]
        path: PathBuf,
    },
    /// Print pen samples until interrupted.
    /// Must not be used while another stream is already running.
    #[bpaf(command)]
    Stream,
}

#[derive(Clone, Debug, Bpaf)]
#[bpaf(options, version, descr(env!("CARGO_PKG_DESCRIPTION")))]
struct Cli {
    /// Increase log verbosity, repeat for more detail
    #[bpaf(short('v'), long("verbose"), req_flag(()), count)]
    verbose: usize,
    /// Upper bound on each request to the tablet, e.g. 500ms or 5s
    #[bpaf(long, argument("DURATION"))]
    timeout: Option<humantime::Duration>,
    #[bpaf(external(command))]
    command: Command,
}

fn init_logging(verbose: usize) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .with_writer(std::io::stderr)
        .init();
}

/// Unwrap an outcome, treating a vanished tablet as an error
fn completed<T>(outcome: Outcome<T>) -> Result<T, Box<dyn Error>> {
    outcome.completed().ok_or_else(|| "tablet disconnected".into())
}

async fn apply<B: HidBackend>(
    tablet: &Stu540<B>,
    command: Command,
    config: &Config,
) -> Result<(), Box<dyn Error>> {
    match command {
        Command::Available => {
            if tablet.is_available().await? {
                println!("tablet attached");
            } else {
                println!("no tablet found");
            }
            Ok(())
        },
        Command::Info => {
            let info = tablet.info().await.ok_or("tablet disconnected")?;
            let serial = completed(tablet.read_serial().await?)?;
            println!("name:     {}", info.device_name.as_deref().unwrap_or("unknown"));
            println!("serial:   {serial}");
            println!("canvas:   {}x{}", info.canvas_width, info.canvas_height);
            if let Some(cap) = info.capability {
                println!("tablet:   {}x{}", cap.tablet_width, cap.tablet_height);
                println!("pressure: {} levels", cap.pressure_resolution as u32 + 1);
            }
            if let Some(scale) = info.scale_factor() {
                println!("scale:    {scale}");
            }
            Ok(())
        },
        Command::Clear => {
            completed(tablet.clear_screen().await?)?;
            println!("cleared screen");
            Ok(())
        },
        Command::Pen { color, width } => {
            let color = color.map_or_else(|| config.pen.color(), Ok)?;
            let width = width.unwrap_or(config.pen.width);
            completed(tablet.set_pen_color_and_width(color, width).await?)?;
            println!("set pen: color={color}, width={width}");
            Ok(())
        },
        Command::Background { color } => {
            let color = color.map_or_else(|| config.display.background_color(), Ok)?;
            completed(tablet.set_background_color(color).await?)?;
            println!("set background: {color}");
            Ok(())
        },
        Command::Image { nearest, bg, path } => {
            let bg = bg.map_or_else(|| config.display.background_color(), Ok)?;
            let nearest = nearest || config.display.use_nearest_neighbor;
            let info = tablet.info().await.ok_or("tablet disconnected")?;
            let options = tablet.options();

            let image = ::image::open(path)?;
            let encoded = encode_bgr24(&image, bg.0, nearest, info.canvas_width, info.canvas_height);
            let len = encoded.len();
            let expected = info.image_len(options.image_format);
            if len != expected {
                return Err(format!("encoded image is {len} bytes, screen expects {expected}").into());
            }
            let total = chunk_count(len, options.chunk_size);
            let fmt_width = total.to_string().len();
            completed(
                tablet
                    .set_image_with_progress(&encoded, |i| {
                        print!("\ruploading {len} bytes ({i:fmt_width$}/{total}) ... ");
                        stdout().flush().ok();
                    })
                    .await?,
            )?;
            println!("done");
            Ok(())
        },
        Command::Stream => {
            let _lock = Lock::acquire()?;
            let shutdown = async {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    tracing::error!("failed to listen for ctrl-c: {e}");
                }
            };
            let count = stream::print_samples(tablet, shutdown, &mut stdout().lock()).await?;
            println!("received {count} samples");
            Ok(())
        },
    }
}

async fn run(command: Command, config: Config, timeout: Duration) -> Result<(), Box<dyn Error>> {
    let options = Options {
        timeout,
        ..Options::default()
    };
    let tablet = Stu540::new(HidapiBackend::new()?, options);

    // availability checks never open the device
    if !matches!(command, Command::Available) && !tablet.connect().await? {
        return Err("no STU-540 tablet found".into());
    }
    let result = apply(&tablet, command, &config).await;
    tablet.disconnect().await?;
    result
}

fn main() -> Result<(), Box<dyn Error>> {
    let cli = cli().run();
    init_logging(cli.verbose);
    let config = Config::load_or_create()?;
    let timeout = cli.timeout.map_or(config.device.timeout, Into::into);

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(run(cli.command, config, timeout))
}

#[cfg(test)]
#[test]
fn generate_docs() {
    let app = env!("CARGO_PKG_NAME");
    let options = cli();

    std::fs::create_dir_all("docs").expect("failed to create docs directory");
    let roff = options.render_manpage(app, bpaf::doc::Section::General, None, None, None);
    std::fs::write("docs/stu-sync.1", roff).expect("failed to write manpage");

    let md = options.header("").render_markdown(app);
    std::fs::write("docs/README.md", md).expect("failed to write markdown docs");
}
