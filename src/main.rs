use oci_image_mirror::cli::{Args, Runner};
use oci_image_mirror::logging;

#[tokio::main]
async fn main() {
    let args = Args::parse_args().from_env();

    if let Err(e) = logging::init(args.verbose, args.log_format) {
        eprintln!("{}", e);
        std::process::exit(1);
    }

    if let Err(e) = Runner::new(args).run().await {
        tracing::error!(error = %e, "oci-image-mirror failed");
        std::process::exit(1);
    }
}
