use std::io;

use clap::{App, Arg};
use kdmesh::{run, LineSink, Problem, RunConfig, DEFAULT_QUERIES};

fn main() {
    let matches = App::new("distributed")
        .about("Nearest neighbour search over a pool of k-d tree workers")
        .arg(Arg::with_name("seed").required(true))
        .arg(Arg::with_name("dim").required(true).help("multiple of 8"))
        .arg(Arg::with_name("points").required(true))
        .arg(Arg::with_name("workers").long("workers").takes_value(true).default_value("15"))
        .arg(Arg::with_name("threads").long("threads").takes_value(true))
        .arg(Arg::with_name("parallel-queries").long("parallel-queries"))
        .get_matches();

    let number = |name: &str| -> usize {
        let value = matches.value_of(name).unwrap_or_default();
        value.parse().unwrap_or_else(|_| {
            eprintln!("<{}> must be a non-negative integer, got {:?}", name, value);
            std::process::exit(1);
        })
    };

    let seed = number("seed") as u64;
    let problem = match Problem::generate(seed, number("dim"), number("points"), DEFAULT_QUERIES) {
        Ok(problem) => problem,
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(1);
        }
    };

    let mut config = RunConfig::new()
        .workers(number("workers"))
        .parallel_queries(matches.is_present("parallel-queries"));
    if matches.is_present("threads") {
        config = config.threads(number("threads"));
    }

    let stdout = io::stdout();
    let mut sink = LineSink::new(stdout.lock());
    if let Err(e) = run(&problem, &config, &mut sink) {
        eprintln!("run aborted: {}", e);
        std::process::exit(1);
    }
}
