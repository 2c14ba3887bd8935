fn main() -> std::process::ExitCode {
    // Control log level with RUST_LOG env var:
    //   RUST_LOG=debug sdc-unpack office.sdc
    //   RUST_LOG=sdc_unpack_lib::sdc::engine=trace sdc-unpack office.sdc
    sdc_unpack_lib::run()
}
