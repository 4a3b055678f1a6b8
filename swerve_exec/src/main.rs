//! Main swerve drive executable entry point.
//!
//! # Architecture
//!
//! The executable runs the drivetrain against the simulated actuator bus:
//!
//!     - Initialise the session, logging and parameters
//!     - Create the simulated bus and the four swerve modules
//!     - Start the physics and odometry sampling threads
//!     - Main loop:
//!         - Issue the demo command on the first cycle
//!         - Drivetrain processing
//!     - Stop the drivetrain and join the threads

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use color_eyre::{Report, eyre::{WrapErr, eyre}};
use log::{debug, info, trace, warn};
use serde::Deserialize;
use std::f64::consts::FRAC_PI_2;
use std::str::FromStr;
use std::thread;
use std::time::{Duration, Instant};
use structopt::StructOpt;

// Internal
use swerve_lib::{
    actuator::{PlantModel, SimBus},
    drivetrain::{
        CmdStatus, DriveCmd, Drivetrain, DrivetrainInit, DrivetrainParams, InputData,
        SwerveKinematics,
    },
    loc::Pose,
    odometry::{OdometrySampler, SwerveOdometry},
    swerve_module::{ModuleParams, SwerveModule},
};
use util::{
    host,
    logger::{logger_init, LevelFilter},
    module::State,
    session::Session,
    time,
};

// ---------------------------------------------------------------------------
// CONSTANTS
// ---------------------------------------------------------------------------

/// Module names, in module order.
const MODULE_NAMES: [&str; 4] = ["front_left", "front_right", "rear_left", "rear_right"];

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Command line options.
#[derive(Debug, StructOpt)]
#[structopt(name = "swerve_exec", about = "Runs the swerve drivetrain in simulation")]
struct Opt {
    /// Parameter file, relative to the params directory of the software root
    #[structopt(short, long, default_value = "swerve_exec.toml")]
    params: String,

    /// How long to run for, in seconds
    #[structopt(short = "t", long, default_value = "10")]
    duration_s: f64,

    /// Manoeuvre to perform: drive, rotate, to-pose or lock
    #[structopt(short, long, default_value = "drive")]
    demo: Demo,
}

/// Parameters for the executable.
#[derive(Debug, Clone, Deserialize)]
struct ExecParams {
    drivetrain: DrivetrainParams,

    /// Shared by all four modules.
    module: ModuleParams,

    /// Plant model of every simulated motor.
    plant: PlantModel,

    /// Units: hertz
    odometry_frequency_hz: f64,

    /// Units: hertz
    physics_frequency_hz: f64,

    /// Samples each signal can buffer between drivetrain cycles.
    sample_queue_capacity: usize,
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
enum Demo {
    Drive,
    Rotate,
    ToPose,
    Lock,
}

// ---------------------------------------------------------------------------
// FUNCTIONS
// ---------------------------------------------------------------------------

/// Executable main function, entry point.
fn main() -> Result<(), Report> {

    // ---- EARLY INITIALISATION ----

    let opt = Opt::from_args();

    // Initialise session
    let session = Session::new(
        "swerve_exec",
        "sessions"
    ).wrap_err("Failed to create the session")?;

    // Initialise logger
    logger_init(LevelFilter::Trace, &session)
        .wrap_err("Failed to initialise logging")?;

    // Log information on this execution.
    info!("Swerve Drive Executable\n");
    info!(
        "Software root: {:?}",
        host::get_sw_root().wrap_err("Failed to get the software root")?
    );
    info!("Session directory: {:?}\n", session.session_root);

    debug!("CLI options: {:?}", opt);

    if !(opt.duration_s > 0.0) {
        return Err(eyre!("Expected a positive duration, found {}", opt.duration_s));
    }

    // ---- LOAD PARAMETERS ----

    let params: ExecParams = util::params::load(&opt.params)
        .wrap_err("Could not load exec params")?;

    for (name, frequency_hz) in [
        ("odometry", params.odometry_frequency_hz),
        ("physics", params.physics_frequency_hz),
    ].iter() {
        time::frequency_to_period_s(*frequency_hz).ok_or_else(|| eyre!(
            "The {} frequency must be positive, found {}", name, frequency_hz
        ))?;
    }

    info!("Exec parameters loaded");

    // ---- INITIALISE MODULES ----

    info!("Initialising modules...");

    let bus = SimBus::new();
    let sampler = OdometrySampler::new(params.sample_queue_capacity);

    let modules = [
        build_module(&bus, &sampler, &params, 0)?,
        build_module(&bus, &sampler, &params, 1)?,
        build_module(&bus, &sampler, &params, 2)?,
        build_module(&bus, &sampler, &params, 3)?,
    ];
    info!("Swerve modules initialised, sampling {} signals", sampler.num_signals());

    let kinematics = SwerveKinematics::new(params.drivetrain.module_pos_m_rb)
        .wrap_err("Invalid drivetrain geometry")?;

    let mut drivetrain = Drivetrain::init(DrivetrainInit {
        params: params.drivetrain.clone(),
        modules,
        estimator: Box::new(SwerveOdometry::new(kinematics, Pose::default())),
    }).wrap_err("Failed to initialise the drivetrain")?;
    info!("Drivetrain init complete");

    info!("Module initialisation complete\n");

    // ---- START THREADS ----

    let physics_handle = bus.spawn_physics(params.physics_frequency_hz);
    let sampler_handle = sampler.start(params.odometry_frequency_hz);

    // ---- MAIN LOOP ----

    info!("Beginning main loop, running {:?} for {} s\n", opt.demo, opt.duration_s);

    let cycle_period_s = params.drivetrain.loop_period_s;
    let start_instant = Instant::now();
    let mut num_cycles: u64 = 0;

    loop {

        // Get cycle start time
        let cycle_start_instant = Instant::now();

        let finished = (cycle_start_instant - start_instant).as_secs_f64() > opt.duration_s;

        let input = InputData {
            cmd: if finished {
                Some(DriveCmd::Stop)
            }
            else if num_cycles == 0 {
                Some(opt.demo.cmd())
            }
            else {
                None
            }
        };

        // ---- DRIVETRAIN PROCESSING ----

        match drivetrain.proc(&input) {
            Ok((output, report)) => {
                match report.cmd_status {
                    Some(CmdStatus::Converged) => info!("Demo command converged"),
                    Some(CmdStatus::TimedOut) => warn!("Demo command timed out"),
                    _ => ()
                }

                trace!("Pose: {:?}", output.pose);
                match serde_json::to_string(&report) {
                    Ok(s) => trace!("Drivetrain status: {}", s),
                    Err(e) => warn!("Could not serialise the drivetrain status: {}", e)
                }
            },
            Err(e) => warn!("Error during drivetrain processing: {}", e)
        };

        if finished {
            break;
        }

        // ---- CYCLE MANAGEMENT ----

        let cycle_dur = Instant::now() - cycle_start_instant;

        // Get sleep duration
        match Duration::from_secs_f64(cycle_period_s)
            .checked_sub(cycle_dur)
        {
            Some(d) => thread::sleep(d),
            None => warn!(
                "Cycle overran by {:.06} s",
                cycle_dur.as_secs_f64() - cycle_period_s
            )
        }

        num_cycles += 1;
    }

    // ---- SHUTDOWN ----

    info!("Final pose: {:?}", drivetrain.pose());

    sampler.stop();
    bus.stop_physics();

    sampler_handle.join()
        .map_err(|_| eyre!("The odometry sampler thread panicked"))?;
    physics_handle.join()
        .map_err(|_| eyre!("The physics thread panicked"))?;

    info!("End of execution after {} cycles", num_cycles);

    Ok(())
}

/// Create the simulated actuators for a module and build the module around
/// them.
fn build_module(
    bus: &SimBus,
    sampler: &OdometrySampler,
    params: &ExecParams,
    index: usize
) -> Result<SwerveModule, Report> {
    let name = MODULE_NAMES[index];
    let drive_id = 2 * index as u32 + 1;
    let steer_id = drive_id + 1;

    bus.add_device(drive_id, params.plant);
    bus.add_device(steer_id, params.plant);

    let drive = bus.actuator(drive_id, &format!("{}_drive", name))
        .wrap_err_with(|| format!("Could not open the {} drive actuator", name))?;
    let steer = bus.actuator(steer_id, &format!("{}_steer", name))
        .wrap_err_with(|| format!("Could not open the {} steer actuator", name))?;

    SwerveModule::new(name, &params.module, Box::new(drive), Box::new(steer), sampler)
        .wrap_err_with(|| format!("Failed to initialise the {} module", name))
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Demo {
    /// The command which performs this demo.
    fn cmd(&self) -> DriveCmd {
        match self {
            Demo::Drive => DriveCmd::OrientationBased {
                vx_ms: 1.0,
                vy_ms: 0.5,
                omega_rads: 0.5,
                field_relative: true,
                closed_loop: true,
            },
            Demo::Rotate => DriveCmd::RotateToTarget(Pose::new(0.0, 2.0, 0.0)),
            Demo::ToPose => DriveCmd::ToPose(Pose::new(1.0, 1.0, FRAC_PI_2)),
            Demo::Lock => DriveCmd::Lock,
        }
    }
}

impl FromStr for Demo {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "drive" => Ok(Demo::Drive),
            "rotate" => Ok(Demo::Rotate),
            "to-pose" => Ok(Demo::ToPose),
            "lock" => Ok(Demo::Lock),
            _ => Err(format!("Unknown demo \"{}\"", s))
        }
    }
}
