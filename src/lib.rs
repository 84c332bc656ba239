pub mod modules {
    pub mod config;
    pub mod error;
    pub mod logging;

    pub mod request_object {
        pub mod request_init;
    }

    pub mod car_object {
        pub mod car;
        pub mod car_queue;
        pub mod car_states;
        pub mod car_handle;
        pub mod car_status_functions;
    }

    pub mod car_subsystem;

    pub mod dispatcher_functions {
        pub mod dispatcher;
        pub mod dispatcher_states;
        pub mod selection;
        pub mod fleet_link;
    }

    pub mod udp_functions {
        pub mod udp;
        pub mod udp_handler_init;
    }

    pub mod floor_functions {
        pub mod csv_parser;
        pub mod floor;
    }
}
