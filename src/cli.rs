use clap::{Arg, ArgAction, Command};

pub fn build_cli() -> Command {
    Command::new("sockowner")
        .version(env!("CARGO_PKG_VERSION"))
        .author("sockowner developers")
        .about("Resolve socket inodes to the processes that hold them")
        .arg(
            Arg::new("inode")
                .value_name("INODE")
                .help("Socket inode to resolve (as shown in /proc/net/tcp)")
                .value_parser(clap::value_parser!(u64))
                .num_args(1..)
                .required_unless_present("all"),
        )
        .arg(
            Arg::new("all")
                .short('a')
                .long("all")
                .help("List the owner of every socket in the process table")
                .action(ArgAction::SetTrue)
                .conflicts_with("inode"),
        )
        .arg(
            Arg::new("proc-root")
                .short('p')
                .long("proc-root")
                .value_name("PATH")
                .help("Root of the process table [default: /proc]")
                .required(false),
        )
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file")
                .required(false),
        )
        .arg(
            Arg::new("log-level")
                .short('l')
                .long("log-level")
                .value_name("LEVEL")
                .help("Set the log level (if not provided, no logging will be enabled)")
                .required(false),
        )
        .arg(
            Arg::new("log-file")
                .long("log-file")
                .value_name("FILE")
                .help("Write logs to FILE instead of stderr")
                .required(false),
        )
}
