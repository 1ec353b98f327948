fn main() -> std::process::ExitCode {
    golden_timer_lib::run()
}
