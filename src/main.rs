use std::path::PathBuf;
use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use nalgebra::Vector3;
use rs_cnc_kinematics::avoidance::avoid_singularities;
use rs_cnc_kinematics::inverse::InverseKinematics;
use rs_cnc_kinematics::jacobian::compute_jacobian;
use rs_cnc_kinematics::kinematic_traits::tool_vector;
use rs_cnc_kinematics::kinematics_impl::forward_kinematics;
use rs_cnc_kinematics::parameters_from_file::from_yaml_file;
use rs_cnc_kinematics::registry::ConfigurationRegistry;
use rs_cnc_kinematics::rtcp::{compute_tcp_compensation, inverse_tcp_compensation};
use rs_cnc_kinematics::settings::KinematicsSettings;
use rs_cnc_kinematics::singularity::{check_config_singularities, detect_singularity};
use rs_cnc_kinematics::toolpath::{Toolpath, ToolpathPoint};
use rs_cnc_kinematics::utils::dump_joints;

#[derive(Parser)]
#[command(name = "rs-cnc-kinematics")]
#[command(about = "Kinematics of 5-axis CNC machines", long_about = None)]
struct Cli {
    /// YAML file with additional machine configurations and settings
    #[arg(long, global = true)]
    machines: Option<PathBuf>,

    /// Machine configuration name
    #[arg(long, global = true, default_value = "HEAD_HEAD_BC")]
    machine: String,

    /// Tool length, mm
    #[arg(long, global = true, default_value_t = 0.0)]
    tool_length: f64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the known machine configurations
    List,
    /// Tool tip position and tool vector for the joint values
    Fk {
        /// Joint values X,Y,Z,<rotary axes in A,B,C order>; mm and degrees
        #[arg(long, value_delimiter = ',', allow_negative_numbers = true)]
        joints: Vec<f64>,
    },
    /// Joint values for the tool tip position and tool vector
    Ik {
        /// Tool tip X,Y,Z, mm
        #[arg(long, value_delimiter = ',', allow_negative_numbers = true)]
        position: Vec<f64>,
        /// Unit tool vector I,J,K
        #[arg(long, value_delimiter = ',', allow_negative_numbers = true)]
        vector: Vec<f64>,
        /// Joint values of the previous point
        #[arg(long, value_delimiter = ',', allow_negative_numbers = true)]
        previous: Option<Vec<f64>>,
    },
    /// RTCP compensation of a programmed position
    Rtcp {
        /// Programmed X,Y,Z (or machine X,Y,Z with --inverse), mm
        #[arg(long, value_delimiter = ',', allow_negative_numbers = true)]
        position: Vec<f64>,
        /// Rotary axis values in A,B,C order, degrees
        #[arg(long, value_delimiter = ',', allow_negative_numbers = true)]
        rotary: Vec<f64>,
        /// Recover the programmed position from machine coordinates
        #[arg(long)]
        inverse: bool,
    },
    /// Singularity check of a joint configuration
    Check {
        #[arg(long, value_delimiter = ',', allow_negative_numbers = true)]
        joints: Vec<f64>,
    },
    /// Analyze a toolpath file and print it with the singular zones corrected
    Avoid {
        /// Text file, one point per line: X Y Z <rotary values> [feed]
        toolpath: PathBuf,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("warn".parse()?),
        )
        .init();

    let cli = Cli::parse();
    let (registry, settings) = match &cli.machines {
        Some(path) => from_yaml_file(path)
            .with_context(|| format!("Failed to load machines from {}", path.display()))?,
        None => (ConfigurationRegistry::with_builtin(), KinematicsSettings::default()),
    };

    if let Commands::List = cli.command {
        for name in registry.names() {
            let config = registry.get(name)?;
            println!("{:16} {:16} {} axes", name, config.family.name(), config.dof());
        }
        return Ok(());
    }

    let config = registry.get(&cli.machine)?;
    match cli.command {
        Commands::List => {}
        Commands::Fk { joints } => {
            let pose = forward_kinematics(&config, &joints)?;
            let v = tool_vector(&pose);
            let tip = pose.translation.vector + v * cli.tool_length;
            println!("Tool tip:    {:10.4} {:10.4} {:10.4}", tip.x, tip.y, tip.z);
            println!("Tool vector: {:10.6} {:10.6} {:10.6}", v.x, v.y, v.z);
            let report = detect_singularity(&compute_jacobian(&config, &joints)?,
                                            settings.thresholds.condition_number);
            println!("Condition number: {:.3}, manipulability: {:.6}",
                     report.condition_number, report.manipulability);
        }
        Commands::Ik { position, vector, previous } => {
            let ik = InverseKinematics::with_settings(config.clone(), cli.tool_length,
                                                      settings.dls, settings.thresholds);
            let solution = ik.solve(&vector3(&position, "position")?, &vector3(&vector, "vector")?,
                                    previous.as_deref())?;
            dump_joints(&solution.joints);
            println!("Solved by {:?}", solution.provenance);
            for warning in &solution.warnings {
                println!("Warning: {}", warning);
            }
        }
        Commands::Rtcp { position, rotary, inverse } => {
            let position = vector3(&position, "position")?;
            let result = if inverse {
                inverse_tcp_compensation(&position, &rotary, &config, cli.tool_length)?
            } else {
                compute_tcp_compensation(&position, &rotary, &config, cli.tool_length)?
            };
            println!("{:10.4} {:10.4} {:10.4}", result.x, result.y, result.z);
        }
        Commands::Check { joints } => {
            let check = check_config_singularities(&config, &joints, &settings.thresholds)?;
            match check.worst() {
                None => println!("No singularity"),
                Some(s) => println!("{}: {} at {:.4}, {:.4} deg from {:.1}", s.severity, s.axis, s.value,
                                    s.distance, s.critical_angle),
            }
        }
        Commands::Avoid { toolpath } => {
            let text = std::fs::read_to_string(&toolpath)
                .with_context(|| format!("Failed to read {}", toolpath.display()))?;
            let path = parse_toolpath(&text, config.dof() - 3)?;
            let (corrected, zones) = avoid_singularities(&config, &path, &settings.thresholds,
                                                         &settings.avoidance)?;
            for zone in &zones {
                println!("# {} zone on {} near {:.1}: points {}..{}, closest {:.4} deg",
                         zone.severity, zone.axis, zone.critical_angle, zone.start, zone.end,
                         zone.min_distance);
            }
            for point in &corrected.points {
                println!("{}", point);
            }
        }
    }
    Ok(())
}

fn vector3(values: &[f64], what: &str) -> Result<Vector3<f64>> {
    if values.len() != 3 {
        bail!("{} needs 3 values, {} given", what, values.len());
    }
    Ok(Vector3::new(values[0], values[1], values[2]))
}

/// Reads whitespace separated points. Lines starting with '#' are comments; a missing
/// feed makes the point a rapid move.
fn parse_toolpath(text: &str, rotary_count: usize) -> Result<Toolpath> {
    let mut points = Vec::new();
    for (number, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let values = line.split_whitespace()
            .map(|v| v.parse::<f64>())
            .collect::<Result<Vec<_>, _>>()
            .with_context(|| format!("line {}: not a number", number + 1))?;
        let columns = 3 + rotary_count;
        if values.len() != columns && values.len() != columns + 1 {
            bail!("line {}: expected {} or {} values, found {}", number + 1, columns, columns + 1, values.len());
        }
        let linear = Vector3::new(values[0], values[1], values[2]);
        let rotary = values[3..columns].to_vec();
        points.push(match values.get(columns) {
            Some(&feed) => ToolpathPoint::new(linear, rotary, feed),
            None => ToolpathPoint::rapid(linear, rotary),
        });
    }
    Ok(Toolpath::new(points))
}
