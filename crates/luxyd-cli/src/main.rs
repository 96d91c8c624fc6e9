//! `luxyd`: test client for the LUXYD AI accelerator.
//!
//! ```text
//! USAGE:
//!   luxyd test   [--device soft|sim|pci:<addr>] [-m M -n N -p P] [--print]
//!   luxyd status [--device soft|sim|pci:<addr>]
//! ```
//!
//! `test` runs the bring-up sequence: map the whole window, zero it, fill
//! A and B, MATRIX_LOAD, MATRIX_MULTIPLY, check P against a host-side
//! product, then STATUS_GET / MODEL_LOAD / INFERENCE_START. The first
//! failing step ends the sequence; the mapping and session are released
//! either way. The exit status is the errno of the failing operation.

use anyhow::{anyhow, bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use luxyd_chip::regs::status;
use luxyd_driver::{
    BusAttachment, ComputeSelection, DriverConfig, LuxydDevice, LuxydError, MatrixDims, PciBus,
    Session, SimulatedBus, WindowKind, WindowMapping,
};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "luxyd", about = "LUXYD AI accelerator test client", version)]
struct Cli {
    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Multiply two patterned matrices and verify the result.
    Test {
        #[command(flatten)]
        device: DeviceArgs,
        /// Rows of A.
        #[arg(short, default_value_t = 32)]
        m: i32,
        /// Columns of A / rows of B.
        #[arg(short, default_value_t = 32)]
        n: i32,
        /// Columns of B.
        #[arg(short, default_value_t = 32)]
        p: i32,
        /// Print A, B and P.
        #[arg(long)]
        print: bool,
    },
    /// Print the status word and advertised dimensions.
    Status {
        #[command(flatten)]
        device: DeviceArgs,
    },
}

#[derive(Args)]
struct DeviceArgs {
    /// `soft` (no hardware), `sim` (simulated board) or `pci:<addr>`.
    #[arg(long, default_value = "soft")]
    device: String,
    /// Window backing: owned or device (overrides LUXYD_WINDOW).
    #[arg(long)]
    window: Option<WindowKind>,
    /// Compute engine: auto, software or hardware (overrides LUXYD_COMPUTE).
    #[arg(long)]
    compute: Option<ComputeSelection>,
    /// Hardware ready timeout in milliseconds.
    #[arg(long)]
    ready_timeout_ms: Option<u64>,
}

enum Target {
    Soft,
    Sim,
    Pci(String),
}

impl DeviceArgs {
    fn target(&self) -> Result<Target> {
        match self.device.as_str() {
            "soft" | "software" => Ok(Target::Soft),
            "sim" => Ok(Target::Sim),
            other => match other.strip_prefix("pci:") {
                Some(addr) if !addr.is_empty() => Ok(Target::Pci(addr.to_string())),
                _ => bail!("unknown device '{other}' (expected soft, sim or pci:<addr>)"),
            },
        }
    }

    fn attach(&self) -> Result<LuxydDevice> {
        let mut config = DriverConfig::from_env()?;
        if let Some(window) = self.window {
            config = config.with_window(window);
        }
        if let Some(compute) = self.compute {
            config = config.with_compute(compute);
        }
        if let Some(ms) = self.ready_timeout_ms {
            config = config.with_ready_timeout(Duration::from_millis(ms));
        }

        let bus: Option<Arc<dyn BusAttachment>> = match self.target()? {
            Target::Soft => None,
            Target::Sim => {
                // The simulated board only models the handshake, not the product
                if self.compute.is_none() {
                    config = config.with_compute(ComputeSelection::Software);
                }
                let sim: Arc<dyn BusAttachment> = Arc::new(SimulatedBus::new()?);
                Some(sim)
            }
            Target::Pci(addr) => {
                let pci: Arc<dyn BusAttachment> = Arc::new(
                    PciBus::attach(&addr).with_context(|| format!("attaching {addr}"))?,
                );
                Some(pci)
            }
        };

        Ok(LuxydDevice::attach(config, bus)?)
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Cmd::Test {
            device,
            m,
            n,
            p,
            print,
        } => cmd_test(&device, MatrixDims::new(m, n, p), print),
        Cmd::Status { device } => cmd_status(&device),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("luxyd: {e:#}");
            ExitCode::from(exit_status(&e))
        }
    }
}

/// errno of the first device error in the chain, else 1
fn exit_status(e: &anyhow::Error) -> u8 {
    let errno = e
        .chain()
        .find_map(|cause| cause.downcast_ref::<LuxydError>())
        .map_or(1, LuxydError::errno);
    u8::try_from(errno).unwrap_or(1)
}

/// Run one command step with the bring-up client's one-line reporting
fn step<T>(label: &str, name: &str, op: impl FnOnce() -> luxyd_driver::Result<T>) -> Result<T> {
    println!("[{label}] {name} sending command");
    match op() {
        Ok(value) => Ok(value),
        Err(e) => {
            eprintln!("[{label}] {name} failed ({}): {e}", e.code());
            Err(e).with_context(|| format!("{name} failed"))
        }
    }
}

fn cmd_test(args: &DeviceArgs, dims: MatrixDims, print: bool) -> Result<()> {
    let label = args.device.as_str();
    println!("\n----- LUXYD AI Test Application -----\n");

    println!("[{label}] Opening device");
    let device = args.attach()?;
    let session = device.open();

    let outcome = run_sequence(label, &session, dims, print);

    println!("[{label}] Closing device");
    drop(session);
    outcome
}

fn run_sequence(label: &str, session: &Session, dims: MatrixDims, print: bool) -> Result<()> {
    let window = session
        .mmap(0, session.window_capacity())
        .context("mapping the window")?;
    println!(
        "[{label}] Mapped {} bytes ({} page-rounded)",
        window.len(),
        window.page_len()
    );

    let outcome = exercise(label, session, &window, dims, print);
    release(label, window);
    outcome
}

fn exercise(
    label: &str,
    session: &Session,
    window: &WindowMapping,
    dims: MatrixDims,
    print: bool,
) -> Result<()> {
    window.fill(0)?;

    step(label, "MATRIX_LOAD", || session.matrix_load(dims))?;
    println!("[{label}] Matrices size information sent successfully");

    let (_, layout) = session.layout()?;
    let (m, n, p) = dims.extents()?;
    let a = pattern(m, n, 2);
    let b = pattern(n, p, 4);
    window.write_u16s(layout.a_offset, &a)?;
    window.write_u16s(layout.b_offset, &b)?;

    step(label, "MATRIX_MULTIPLY", || session.matrix_multiply())?;
    println!("[{label}] MATRIX_MULTIPLY success");

    let result = window.read_u32s(layout.p_offset, m * p)?;
    if print {
        print_matrix("A", m, n, &a);
        print_matrix("B", n, p, &b);
        print_matrix("P", m, p, &result);
        println!();
    }
    verify(&a, &b, &result, m, n, p)?;
    println!("[{label}] Result matches host reference ({m}x{p})");

    let value = step(label, "STATUS_GET", || session.status_get())?;
    println!("[{label}] STATUS_GET success, received {value:#010x}");

    step(label, "MODEL_LOAD", || session.model_load(value))?;
    println!("[{label}] MODEL_LOAD success");

    let echoed = step(label, "INFERENCE_START", || session.inference_start(value))?;
    println!("[{label}] INFERENCE_START success, received {echoed:#010x}");
    Ok(())
}

fn release(label: &str, window: WindowMapping) {
    println!("[{label}] Releasing {} byte mapping", window.len());
    drop(window);
}

fn cmd_status(args: &DeviceArgs) -> Result<()> {
    let device = args.attach()?;
    let session = device.open();
    let value = session.status_get()?;

    println!("Device   : {}", args.device);
    println!(
        "Window   : {} ({} bytes)",
        device.window_kind(),
        device.capacity()
    );
    println!("Compute  : {}", device.engine_type());
    println!("Status   : {value:#010x} ({})", describe_status(value));

    match device.read_info()? {
        Some(info) => println!(
            "Info     : A {}x{}  B {}x{}",
            info.mat_a_rows, info.mat_a_cols, info.mat_b_rows, info.mat_b_cols
        ),
        None => println!("Info     : (no hardware)"),
    }

    Ok(())
}

fn describe_status(value: u32) -> String {
    let flags: Vec<&str> = [
        (status::READY, "READY"),
        (status::BUSY, "BUSY"),
        (status::ERROR, "ERROR"),
    ]
    .iter()
    .filter(|(bit, _)| value & bit != 0)
    .map(|&(_, name)| name)
    .collect();

    if flags.is_empty() {
        "idle".to_string()
    } else {
        flags.join("|")
    }
}

/// `M[i][j] = (i+1)·scale + (j+1)`, truncated to u16
#[allow(clippy::cast_possible_truncation)]
fn pattern(rows: usize, cols: usize, scale: usize) -> Vec<u16> {
    (0..rows)
        .flat_map(|i| (0..cols).map(move |j| ((i + 1) * scale + (j + 1)) as u16))
        .collect()
}

#[allow(clippy::cast_possible_truncation)]
fn verify(a: &[u16], b: &[u16], got: &[u32], m: usize, n: usize, p: usize) -> Result<()> {
    for i in 0..m {
        for j in 0..p {
            let expected: u64 = (0..n)
                .map(|k| u64::from(a[i * n + k]) * u64::from(b[k * p + j]))
                .sum();
            let actual = got[i * p + j];
            if actual != expected as u32 {
                return Err(anyhow!(
                    "P[{i}][{j}] = {actual}, expected {}",
                    expected as u32
                ));
            }
        }
    }
    Ok(())
}

fn print_matrix<T: std::fmt::Display>(name: &str, rows: usize, cols: usize, values: &[T]) {
    println!("\nMatrix {name} ({rows}x{cols}):");
    for row in values.chunks(cols).take(rows) {
        for value in row {
            print!("{value:5} ");
        }
        println!();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pattern_matches_bring_up_fill() {
        assert_eq!(pattern(2, 3, 2), vec![3, 4, 5, 5, 6, 7]);
        assert_eq!(pattern(1, 2, 4), vec![5, 6]);
    }

    #[test]
    fn verify_detects_mismatch() {
        verify(&[3, 4, 5, 6], &[5, 6, 7, 8], &[43, 50, 67, 78], 2, 2, 2).unwrap();
        assert!(verify(&[3, 4, 5, 6], &[5, 6, 7, 8], &[43, 50, 67, 0], 2, 2, 2).is_err());
    }

    #[test]
    fn device_errors_set_errno_exit() {
        let err = anyhow::Error::new(LuxydError::NotLoaded).context("MATRIX_MULTIPLY failed");
        assert_eq!(i32::from(exit_status(&err)), LuxydError::NotLoaded.errno());
        assert_eq!(exit_status(&anyhow!("glue")), 1);
    }

    #[test]
    fn status_flags() {
        assert_eq!(describe_status(status::READY), "READY");
        assert_eq!(describe_status(status::BUSY | status::ERROR), "BUSY|ERROR");
        assert_eq!(describe_status(0), "idle");
    }

    #[test]
    fn targets_parse() {
        let args = |device: &str| DeviceArgs {
            device: device.to_string(),
            window: None,
            compute: None,
            ready_timeout_ms: None,
        };
        assert!(matches!(args("sim").target(), Ok(Target::Sim)));
        assert!(matches!(args("pci:0000:01:00.0").target(), Ok(Target::Pci(a)) if a == "0000:01:00.0"));
        assert!(args("pci:").target().is_err());
        assert!(args("usb").target().is_err());
    }

    #[test]
    fn software_sequence_succeeds() {
        let device = args_soft().attach().unwrap();
        let session = device.open();
        run_sequence("test", &session, MatrixDims::square(4), false).unwrap();
    }

    #[test]
    fn bad_dims_fail_with_einval() {
        let device = args_soft().attach().unwrap();
        let session = device.open();
        let err = run_sequence("test", &session, MatrixDims::new(0, 4, 4), false).unwrap_err();
        assert_eq!(
            i32::from(exit_status(&err)),
            LuxydError::invalid_argument("m").errno()
        );
    }

    fn args_soft() -> DeviceArgs {
        DeviceArgs {
            device: "soft".to_string(),
            window: None,
            compute: Some(ComputeSelection::Software),
            ready_timeout_ms: None,
        }
    }
}
