//! Simulated host - causal profiling of a three-stage pipeline
//!
//! Worker threads run `parse -> compute -> emit` in a loop. Each stage
//! publishes its current method/offset in thread-local state, which the
//! simulated host hands to the sampler as the interrupted "stack". The emit
//! stage carries the progress point.
//!
//! Usage: `simulate [seconds] [agent options]`
//!
//! # Environment Variables
//!
//! - `CAUSAL_LOG_LEVEL=debug` - Set log level (off, error, warn, info, debug, trace)
//! - `CAUSAL_FLUSH_EPRINT=1` - Flush log output immediately
//! - `CAUSAL_SIGNAL_INTERVAL_US`, `CAUSAL_MIN_EXP_MS`, ... - Tuning knobs

use causal::{
    kinfo, CallFrame, CaptureError, Host, HostError, LineTable, LoadedClass, ManagedThread,
    MethodId, Profiler, ProfilerConfig, SignalContext,
};
use rand::Rng;
use std::cell::Cell;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

const PARSE: MethodId = MethodId::new(0x10);
const COMPUTE: MethodId = MethodId::new(0x20);
const EMIT: MethodId = MethodId::new(0x30);
const RUN: MethodId = MethodId::new(0x40);

const PIPELINE: &str = "Lsim/Pipeline;";
const DRIVER: &str = "Lsim/Driver;";

const DEFAULT_OPTIONS: &str =
    "search_scopes=sim,progress_point=sim.Pipeline:31,output_file=causal-simulate.csv";

thread_local! {
    static CURRENT_METHOD: Cell<usize> = const { Cell::new(0) };
    static CURRENT_OFFSET: Cell<i32> = const { Cell::new(0) };
}

fn enter(method: MethodId, offset: i32) {
    CURRENT_METHOD.with(|m| m.set(method.as_usize()));
    CURRENT_OFFSET.with(|o| o.set(offset));
}

struct SimHost {
    breakpoint: Mutex<Option<(MethodId, i32)>>,
    armed: AtomicBool,
}

impl SimHost {
    fn new() -> Self {
        Self {
            breakpoint: Mutex::new(None),
            armed: AtomicBool::new(false),
        }
    }

    fn is_armed(&self) -> bool {
        self.armed.load(Ordering::Acquire)
    }
}

impl Host for SimHost {
    fn capture_frames(
        &self,
        _context: SignalContext,
        frames: &mut [CallFrame],
    ) -> Result<usize, CaptureError> {
        let method = CURRENT_METHOD
            .try_with(|m| m.get())
            .map_err(|_| CaptureError::Unavailable)?;
        let offset = CURRENT_OFFSET.try_with(|o| o.get()).unwrap_or(0);
        if method == 0 || frames.len() < 2 {
            return Err(CaptureError::NotWalkable(-1));
        }
        frames[0] = CallFrame::new(MethodId::new(method), offset);
        frames[1] = CallFrame::new(RUN, 4);
        Ok(2)
    }

    fn loaded_classes(&self) -> Result<Vec<LoadedClass>, HostError> {
        Ok(vec![
            LoadedClass {
                signature: PIPELINE.into(),
                methods: vec![PARSE, COMPUTE, EMIT],
            },
            LoadedClass {
                signature: DRIVER.into(),
                methods: vec![RUN],
            },
        ])
    }

    fn line_number_table(&self, method: MethodId) -> Result<LineTable, HostError> {
        let pairs: &[(i32, i32)] = match method {
            PARSE => &[(0, 10), (8, 11), (20, 12)],
            COMPUTE => &[(0, 20), (6, 21), (30, 22), (40, 21)],
            EMIT => &[(0, 30), (3, 31)],
            RUN => &[(0, 3), (4, 4), (9, 5)],
            _ => return Err(HostError::InvalidMethod),
        };
        Ok(LineTable::from_pairs(pairs))
    }

    fn declaring_class_signature(&self, method: MethodId) -> Result<String, HostError> {
        match method {
            PARSE | COMPUTE | EMIT => Ok(PIPELINE.into()),
            RUN => Ok(DRIVER.into()),
            _ => Err(HostError::InvalidMethod),
        }
    }

    fn set_breakpoint(&self, method: MethodId, offset: i32) -> Result<(), HostError> {
        *self.breakpoint.lock().map_err(|_| HostError::Other(-1))? = Some((method, offset));
        self.armed.store(true, Ordering::Release);
        Ok(())
    }

    fn clear_breakpoint(&self, _method: MethodId, _offset: i32) -> Result<(), HostError> {
        self.armed.store(false, Ordering::Release);
        Ok(())
    }

    fn is_application_thread(&self, thread: ManagedThread) -> Result<bool, HostError> {
        Ok(thread.0 != 0)
    }
}

/// Burn CPU for `d` while "executing" `method` at `offset`.
fn busy(method: MethodId, offset: i32, d: Duration) {
    enter(method, offset);
    let start = Instant::now();
    while start.elapsed() < d {
        std::hint::spin_loop();
    }
}

fn main() {
    println!("=== Causal Profiler Simulation ===\n");

    let seconds: u64 = std::env::args()
        .nth(1)
        .and_then(|s| s.parse().ok())
        .unwrap_or(20);
    let options = std::env::args()
        .nth(2)
        .unwrap_or_else(|| DEFAULT_OPTIONS.to_string());

    causal::init_logging();
    let config = match ProfilerConfig::parse_options(&options) {
        Ok(config) => config.experiment_bounds(Duration::from_millis(50), Duration::from_secs(2)),
        Err(e) => {
            eprintln!("bad options: {}", e);
            std::process::exit(2);
        }
    };

    let host = Arc::new(SimHost::new());
    let profiler = match Profiler::new(config, host.clone()) {
        Ok(p) => Arc::new(p),
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(1);
        }
    };
    if let Err(e) = profiler.start() {
        eprintln!("{}", e);
        std::process::exit(1);
    }

    let quit = Arc::new(AtomicBool::new(false));
    let emitted = Arc::new(AtomicU64::new(0));

    let workers: Vec<_> = (1..=4)
        .map(|id| {
            let profiler = Arc::clone(&profiler);
            let host = Arc::clone(&host);
            let quit = Arc::clone(&quit);
            let emitted = Arc::clone(&emitted);
            thread::Builder::new()
                .name(format!("sim-worker-{}", id))
                .spawn(move || {
                    profiler.on_thread_start(ManagedThread(id));
                    let mut rng = rand::thread_rng();
                    while !quit.load(Ordering::Acquire) {
                        busy(PARSE, rng.gen_range(0..24), Duration::from_micros(150));
                        busy(COMPUTE, rng.gen_range(6..30), Duration::from_micros(400));
                        busy(COMPUTE, 41, Duration::from_micros(100));
                        enter(EMIT, 3);
                        if host.is_armed() {
                            profiler.on_breakpoint();
                        }
                        emitted.fetch_add(1, Ordering::Relaxed);
                    }
                    enter(MethodId::NONE, 0);
                    profiler.on_thread_end();
                })
        })
        .filter_map(Result::ok)
        .collect();

    kinfo!("Simulating {} workers for {}s", workers.len(), seconds);
    thread::sleep(Duration::from_secs(seconds));

    quit.store(true, Ordering::Release);
    for w in workers {
        let _ = w.join();
    }
    profiler.stop();

    println!("\n=== Results ===");
    println!("Items emitted:   {}", emitted.load(Ordering::Relaxed));
    println!("Sampler:         {}", profiler.sampler_stats());
    for line in profiler.line_hits_dump() {
        println!("  {}", line);
    }
    println!("Output:          {}", profiler.config().output_file.display());
    println!("\n=== Simulation Complete ===");
}
