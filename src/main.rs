use std::io::BufRead;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use log::debug;
use tokio::runtime::Builder;

use nsca_push::client::submit_results;
use nsca_push::config::{ConnectionInfo, load_config};
use nsca_push::packet::CheckResult;
use nsca_push::resolver::{NativeResolver, Resolver};

fn print_usage_and_exit(arg0: String) -> ! {
    eprintln!("Usage: {arg0} [--timeout/-t SECS] <config filename>");
    eprintln!();
    eprintln!("Check results are read from stdin, one per line:");
    eprintln!("  <host>\\t<service>\\t<return code>\\t<output>");
    eprintln!("  <host>\\t<return code>\\t<output>        (host check)");
    std::process::exit(3);
}

fn parse_check_line(line: &str) -> std::io::Result<CheckResult> {
    let fields: Vec<&str> = line.split('\t').collect();
    let (host, service, code_str, output) = match fields.as_slice() {
        [host, service, code, output] => (*host, *service, *code, *output),
        [host, code, output] => (*host, "", *code, *output),
        _ => {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("expected 3 or 4 tab-separated fields: {line}"),
            ));
        }
    };
    let code = code_str.parse::<u8>().map_err(|e| {
        std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("invalid return code {code_str}: {e}"),
        )
    })?;
    Ok(CheckResult {
        host: host.to_string(),
        service: service.to_string(),
        code,
        output: output.to_string(),
    })
}

fn read_check_results() -> std::io::Result<Vec<CheckResult>> {
    let stdin = std::io::stdin();
    let mut results = vec![];
    for line in stdin.lock().lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        results.push(parse_check_line(&line)?);
    }
    Ok(results)
}

fn main() {
    env_logger::builder()
        .format(|buf, record| {
            let timestamp = buf.timestamp();
            writeln!(
                buf,
                "[{} {} {}] {}",
                timestamp,
                record.level(),
                record.target(),
                record.args()
            )
        })
        .init();

    let mut args: Vec<String> = std::env::args().collect();
    let arg0 = args.remove(0);
    let mut timeout_override: Option<u64> = None;

    while !args.is_empty() && args[0].starts_with('-') {
        if args[0] == "--timeout" || args[0] == "-t" {
            args.remove(0);
            if args.is_empty() {
                eprintln!("Missing timeout argument.");
                print_usage_and_exit(arg0);
            }
            timeout_override = match args.remove(0).parse::<u64>() {
                Ok(n) if n > 0 => Some(n),
                Ok(_) => {
                    eprintln!("Timeout must be positive.");
                    print_usage_and_exit(arg0);
                }
                Err(e) => {
                    eprintln!("Invalid timeout: {e}");
                    print_usage_and_exit(arg0);
                }
            };
        } else {
            eprintln!("Invalid argument: {}", args[0]);
            print_usage_and_exit(arg0);
        }
    }

    if args.len() != 1 {
        print_usage_and_exit(arg0);
    }
    let config_filename = args.remove(0);

    let results = match read_check_results() {
        Ok(r) => r,
        Err(e) => {
            eprintln!("Failed to read check results from stdin: {e}");
            std::process::exit(3);
        }
    };
    if results.is_empty() {
        eprintln!("No check results on stdin, nothing to do.");
        std::process::exit(0);
    }
    debug!("read {} check results from stdin", results.len());

    let runtime = Builder::new_current_thread()
        .enable_io()
        .enable_time()
        .build()
        .expect("Could not build tokio runtime");

    let exit_code = runtime.block_on(async move {
        let config = match load_config(&config_filename).await {
            Ok(c) => c,
            Err(e) => {
                eprintln!("Failed to load config: {e}");
                return 3;
            }
        };

        let mut info = match ConnectionInfo::from_config(&config) {
            Ok(i) => i,
            Err(e) => {
                eprintln!("Invalid config: {e}");
                return 3;
            }
        };
        if let Some(secs) = timeout_override {
            info.timeout = Duration::from_secs(secs);
        }

        let result_count = results.len();
        let resolver: Arc<dyn Resolver> = Arc::new(NativeResolver::new());
        match submit_results(&info, &resolver, results).await {
            Ok(true) => {
                println!("{result_count} check result(s) submitted to {}", info.location);
                0
            }
            Ok(false) => {
                eprintln!("Timed out submitting to {}", info.location);
                2
            }
            Err(e) => {
                eprintln!("Failed to submit to {}: {e}", info.location);
                3
            }
        }
    });

    std::process::exit(exit_code);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_service_check_line() {
        let result = parse_check_line("web01\tload\t1\tWARNING - load 8.01").unwrap();
        assert_eq!(result.host, "web01");
        assert_eq!(result.service, "load");
        assert_eq!(result.code, 1);
        assert_eq!(result.output, "WARNING - load 8.01");
    }

    #[test]
    fn test_parse_host_check_line() {
        let result = parse_check_line("router\t0\tPING OK").unwrap();
        assert_eq!(result.host, "router");
        assert!(result.service.is_empty());
        assert_eq!(result.code, 0);
    }

    #[test]
    fn test_parse_invalid_lines() {
        assert!(parse_check_line("web01").is_err());
        assert!(parse_check_line("web01\tload\tnot-a-code\toutput").is_err());
    }
}
