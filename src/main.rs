use std::process::ExitCode;

fn main() -> ExitCode {
    authcode_lib::run()
}
